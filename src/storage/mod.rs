//! Slot repository.
//!
//! This module defines the `Storage` trait, the durable home of tee-time
//! slots, golf courses and package links. Every slot mutation goes through
//! [`Storage::conditional_update`], which is the only place races between
//! callers are arbitrated.

use crate::domain::classify::BookingCategory;
use crate::domain::course::{CourseId, GolfCourse};
use crate::domain::package::{PackageLink, PackageLinkId};
use crate::domain::slot::{
    AnySlot, Available, Slot, SlotData, SlotId, SlotKind, SlotState, SlotStatus,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

/// Result of a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The write was applied; the slot now carries `version`.
    Applied { version: i64 },
    /// The stored slot no longer has the expected status and version.
    /// Nothing was written.
    Conflict,
    /// No slot with this id exists.
    NotFound,
}

/// Filter for slot queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotFilter {
    /// Match any of these statuses (empty matches all)
    pub statuses: Vec<SlotStatus>,
    pub course_id: Option<CourseId>,
    /// Inclusive lower bound on the play date
    pub date_from: Option<NaiveDate>,
    /// Exclusive upper bound on the play date
    pub date_until: Option<NaiveDate>,
    pub category: Option<BookingCategory>,
    pub kind: Option<SlotKind>,
}

impl SlotFilter {
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = SlotStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_dates(mut self, from: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_until = until;
        self
    }

    pub fn with_category(mut self, category: BookingCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_kind(mut self, kind: Option<SlotKind>) -> Self {
        self.kind = kind;
        self
    }

    /// Evaluate the filter against one slot.
    pub fn matches(&self, slot: &AnySlot) -> bool {
        let data = slot.data();
        (self.statuses.is_empty() || self.statuses.contains(&slot.status()))
            && self.course_id.is_none_or(|id| id == data.course_id)
            && self.date_from.is_none_or(|from| data.date >= from)
            && self.date_until.is_none_or(|until| data.date < until)
            && self.category.is_none_or(|category| category == data.category)
            && self.kind.is_none_or(|kind| kind == data.kind)
    }
}

/// Storage trait for tee-time slots and their reference data.
///
/// The typestate on [`Slot`] ensures only valid next states are handed to
/// [`Storage::conditional_update`], so implementations don't validate
/// transitions; they only compare status and version.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store a newly registered slot as `Available` at version 0.
    async fn create_slot(&self, data: SlotData) -> Result<Slot<Available>>;

    /// Get a slot in whatever state it is in.
    async fn get_slot(&self, id: SlotId) -> Result<AnySlot>;

    /// Atomically replace the stored slot with `slot` if the stored slot
    /// still has status `expected` and version `slot.version`.
    ///
    /// On success the stored version becomes `slot.version + 1`.
    async fn conditional_update<T: SlotState + Clone>(
        &self,
        slot: &Slot<T>,
        expected: SlotStatus,
    ) -> Result<UpdateOutcome>
    where
        AnySlot: From<Slot<T>>;

    /// Slots matching the filter, ordered by date then time.
    ///
    /// For read endpoints, the matrix and sweep scans only. Results may lag
    /// the write path.
    async fn query_slots(&self, filter: &SlotFilter) -> Result<Vec<AnySlot>>;

    /// Insert or replace a golf course.
    async fn upsert_course(&self, course: GolfCourse) -> Result<()>;

    async fn get_course(&self, id: CourseId) -> Result<Option<GolfCourse>>;

    /// All courses in dashboard order (region name, then sequence).
    async fn list_courses(&self) -> Result<Vec<GolfCourse>>;

    /// Store two package slots and the link between them, all or nothing.
    async fn create_package(
        &self,
        primary: SlotData,
        connected: SlotData,
        link: PackageLink,
    ) -> Result<(Slot<Available>, Slot<Available>, PackageLink)>;

    /// The link a slot takes part in, on either side.
    async fn get_package_link_for_slot(&self, slot_id: SlotId) -> Result<Option<PackageLink>>;

    /// Remove a link. The linked slots are left untouched.
    async fn dissolve_package_link(&self, id: PackageLinkId) -> Result<()>;
}
