//! In-process storage backend.
//!
//! Slots live in a sharded [`DashMap`]; a conditional update compares and
//! replaces an entry while holding that entry's shard lock, which gives the
//! same at-most-one-winner behaviour as the row-level check in the SQL
//! backend. Used by tests and by hosts that don't need durability.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;

use super::{SlotFilter, Storage, UpdateOutcome};
use crate::domain::course::{self, CourseId, GolfCourse};
use crate::domain::package::{PackageLink, PackageLinkId};
use crate::domain::slot::{
    Available, AnySlot, Slot, SlotData, SlotId, SlotState, SlotStatus,
};
use crate::error::{Result, TeeTimeError};

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    slots: DashMap<SlotId, AnySlot>,
    courses: RwLock<HashMap<CourseId, GolfCourse>>,
    links: RwLock<HashMap<PackageLinkId, PackageLink>>,
    writes_unavailable: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every slot write fail as if the store were unreachable.
    ///
    /// Reads keep working, so sweeps get as far as their first update.
    pub fn set_writes_unavailable(&self, unavailable: bool) {
        self.writes_unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.writes_unavailable.load(Ordering::SeqCst) {
            return Err(TeeTimeError::Other(anyhow!("slot store unavailable")));
        }
        Ok(())
    }
}

fn new_slot(data: SlotData) -> Slot<Available> {
    Slot {
        state: Available {},
        data,
        version: 0,
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    #[tracing::instrument(
        skip(self, data),
        fields(slot_id = %data.id, course_id = %data.course_id)
    )]
    async fn create_slot(&self, data: SlotData) -> Result<Slot<Available>> {
        self.check_writable()?;

        match self.slots.entry(data.id) {
            Entry::Occupied(_) => Err(TeeTimeError::InvalidInput(format!(
                "Slot {} already exists",
                data.id
            ))),
            Entry::Vacant(vacant) => {
                let slot = new_slot(data);
                vacant.insert(AnySlot::from(slot.clone()));
                Ok(slot)
            }
        }
    }

    async fn get_slot(&self, id: SlotId) -> Result<AnySlot> {
        self.slots
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(TeeTimeError::SlotNotFound(id))
    }

    async fn conditional_update<T: SlotState + Clone>(
        &self,
        slot: &Slot<T>,
        expected: SlotStatus,
    ) -> Result<UpdateOutcome>
    where
        AnySlot: From<Slot<T>>,
    {
        self.check_writable()?;

        let Some(mut entry) = self.slots.get_mut(&slot.data.id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        let current = entry.value_mut();
        if current.status() != expected || current.version() != slot.version {
            return Ok(UpdateOutcome::Conflict);
        }

        let version = slot.version + 1;
        let mut next = AnySlot::from(slot.clone());
        next.set_version(version);
        *current = next;

        Ok(UpdateOutcome::Applied { version })
    }

    async fn query_slots(&self, filter: &SlotFilter) -> Result<Vec<AnySlot>> {
        let mut slots: Vec<AnySlot> = self
            .slots
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        slots.sort_by(|a, b| {
            let (a, b) = (a.data(), b.data());
            (a.date, a.time, *a.id).cmp(&(b.date, b.time, *b.id))
        });
        Ok(slots)
    }

    async fn upsert_course(&self, course: GolfCourse) -> Result<()> {
        self.courses.write().insert(course.id, course);
        Ok(())
    }

    async fn get_course(&self, id: CourseId) -> Result<Option<GolfCourse>> {
        Ok(self.courses.read().get(&id).cloned())
    }

    async fn list_courses(&self) -> Result<Vec<GolfCourse>> {
        let mut courses: Vec<GolfCourse> = self.courses.read().values().cloned().collect();
        course::sort_for_display(&mut courses);
        Ok(courses)
    }

    #[tracing::instrument(skip_all, fields(link_id = %link.id))]
    async fn create_package(
        &self,
        primary: SlotData,
        connected: SlotData,
        link: PackageLink,
    ) -> Result<(Slot<Available>, Slot<Available>, PackageLink)> {
        self.check_writable()?;

        if primary.id == connected.id {
            return Err(TeeTimeError::InvalidInput(
                "A package links two distinct slots".to_string(),
            ));
        }

        // Held for the whole registration so the link appears with its slots
        let mut links = self.links.write();

        let primary = new_slot(primary);
        let connected = new_slot(connected);

        // One entry at a time: both ids may hash to the same shard
        match self.slots.entry(primary.data.id) {
            Entry::Occupied(_) => {
                return Err(TeeTimeError::InvalidInput(format!(
                    "Slot {} already exists",
                    primary.data.id
                )));
            }
            Entry::Vacant(vacant) => {
                vacant.insert(AnySlot::from(primary.clone()));
            }
        }
        let connected_taken = match self.slots.entry(connected.data.id) {
            Entry::Occupied(_) => true,
            Entry::Vacant(vacant) => {
                vacant.insert(AnySlot::from(connected.clone()));
                false
            }
        };
        if connected_taken {
            self.slots.remove(&primary.data.id);
            return Err(TeeTimeError::InvalidInput(format!(
                "Slot {} already exists",
                connected.data.id
            )));
        }
        links.insert(link.id, link.clone());

        Ok((primary, connected, link))
    }

    async fn get_package_link_for_slot(&self, slot_id: SlotId) -> Result<Option<PackageLink>> {
        Ok(self
            .links
            .read()
            .values()
            .find(|link| link.involves(slot_id))
            .cloned())
    }

    async fn dissolve_package_link(&self, id: PackageLinkId) -> Result<()> {
        self.links
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(TeeTimeError::PackageNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::{Actor, UserId};
    use crate::domain::slot::{Held, SlotInput, SlotKind};
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn data(course_id: CourseId, date: &str, players: u8) -> SlotData {
        SlotInput {
            course_id,
            date: date.to_string(),
            time: "07:10".to_string(),
            green_fee: "99000".to_string(),
            player_count: players,
            request_type: "transfer".to_string(),
            hole_count: 18,
            caddy_type: "none".to_string(),
            includes_deposit: false,
            includes_meal: false,
            includes_cart: false,
            requirement_note: String::new(),
            kind: SlotKind::SingleDay,
        }
        .into_data(SlotId(Uuid::new_v4()))
        .unwrap()
    }

    fn held(slot: &Slot<Available>) -> Slot<Held> {
        Slot {
            state: Held {
                holder: Actor {
                    user_id: UserId::from("a"),
                    team_id: None,
                },
                held_at: Utc::now(),
            },
            data: slot.data.clone(),
            version: slot.version,
        }
    }

    #[tokio::test]
    async fn test_conditional_update_compares_status_and_version() {
        let storage = InMemoryStorage::new();
        let slot = storage
            .create_slot(data(CourseId(Uuid::new_v4()), "2026-06-10", 2))
            .await
            .unwrap();

        let outcome = storage
            .conditional_update(&held(&slot), SlotStatus::Available)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied { version: 1 });

        // Same expected status, stale version
        let outcome = storage
            .conditional_update(&held(&slot), SlotStatus::Available)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Conflict);

        let stored = storage.get_slot(slot.data.id).await.unwrap();
        assert_eq!(stored.status(), SlotStatus::Held);
        assert_eq!(stored.version(), 1);
    }

    #[tokio::test]
    async fn test_conditional_update_on_unknown_slot() {
        let storage = InMemoryStorage::new();
        let slot = new_slot(data(CourseId(Uuid::new_v4()), "2026-06-10", 2));
        let outcome = storage
            .conditional_update(&held(&slot), SlotStatus::Available)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::NotFound);
        assert!(matches!(
            storage.get_slot(slot.data.id).await,
            Err(TeeTimeError::SlotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_query_filters_and_orders() {
        let storage = InMemoryStorage::new();
        let course = CourseId(Uuid::new_v4());
        let late = storage.create_slot(data(course, "2026-06-12", 4)).await.unwrap();
        let early = storage.create_slot(data(course, "2026-06-10", 4)).await.unwrap();
        storage.create_slot(data(course, "2026-06-11", 2)).await.unwrap();
        storage
            .create_slot(data(CourseId(Uuid::new_v4()), "2026-06-11", 4))
            .await
            .unwrap();

        let filter = SlotFilter {
            course_id: Some(course),
            ..Default::default()
        }
        .with_category(crate::domain::classify::BookingCategory::FullGroup);
        let ids: Vec<_> = storage
            .query_slots(&filter)
            .await
            .unwrap()
            .iter()
            .map(|s| s.id())
            .collect();
        assert_eq!(ids, vec![early.data.id, late.data.id]);

        let window = SlotFilter::default().with_dates(
            NaiveDate::from_ymd_opt(2026, 6, 11),
            NaiveDate::from_ymd_opt(2026, 6, 12),
        );
        assert_eq!(storage.query_slots(&window).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_slot_rejected() {
        let storage = InMemoryStorage::new();
        let slot_data = data(CourseId(Uuid::new_v4()), "2026-06-10", 2);
        storage.create_slot(slot_data.clone()).await.unwrap();
        assert!(matches!(
            storage.create_slot(slot_data).await,
            Err(TeeTimeError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_unavailable_is_systemic() {
        let storage = InMemoryStorage::new();
        let slot = storage
            .create_slot(data(CourseId(Uuid::new_v4()), "2026-06-10", 2))
            .await
            .unwrap();

        storage.set_writes_unavailable(true);
        let err = storage
            .conditional_update(&held(&slot), SlotStatus::Available)
            .await
            .unwrap_err();
        assert!(err.is_systemic());
        // reads still work
        storage.get_slot(slot.data.id).await.unwrap();
    }

    fn link_between(primary: &SlotData, connected: &SlotData) -> PackageLink {
        PackageLink {
            id: PackageLinkId(Uuid::new_v4()),
            primary_slot_id: primary.id,
            connected_slot_id: connected.id,
            accommodation_note: String::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_package_with_taken_slot_id_leaves_nothing_behind() {
        let storage = InMemoryStorage::new();
        let course = CourseId(Uuid::new_v4());
        let existing = storage.create_slot(data(course, "2026-06-11", 4)).await.unwrap();

        let primary = data(course, "2026-06-10", 4);
        let connected = SlotData {
            requirement_note: "second day".to_string(),
            ..existing.data.clone()
        };
        let link = link_between(&primary, &connected);
        assert!(matches!(
            storage
                .create_package(primary.clone(), connected, link)
                .await,
            Err(TeeTimeError::InvalidInput(_))
        ));

        assert!(matches!(
            storage.get_slot(primary.id).await,
            Err(TeeTimeError::SlotNotFound(_))
        ));
        assert_eq!(
            storage.get_slot(existing.data.id).await.unwrap().data(),
            &existing.data
        );
        assert_eq!(
            storage.get_package_link_for_slot(existing.data.id).await.unwrap(),
            None
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_package_and_single_slot_racing_for_an_id() {
        let storage = std::sync::Arc::new(InMemoryStorage::new());
        let course = CourseId(Uuid::new_v4());

        for _ in 0..32 {
            let single = data(course, "2026-06-10", 4);
            let primary = SlotData {
                requirement_note: "package".to_string(),
                ..single.clone()
            };
            let connected = data(course, "2026-06-11", 4);
            let link = link_between(&primary, &connected);

            let single_task = {
                let storage = storage.clone();
                let single = single.clone();
                tokio::spawn(async move { storage.create_slot(single).await })
            };
            let package_task = {
                let storage = storage.clone();
                tokio::spawn(async move { storage.create_package(primary, connected, link).await })
            };
            let single_won = single_task.await.unwrap().is_ok();
            let package_won = package_task.await.unwrap().is_ok();

            // exactly one registration owns the id, and the stored slot is its
            assert!(single_won != package_won);
            let stored = storage.get_slot(single.id).await.unwrap();
            let expected_note = if single_won { "" } else { "package" };
            assert_eq!(stored.data().requirement_note, expected_note);
        }
    }
}
