//! Reservation endpoints exposed to the surrounding application.
//!
//! [`ReservationService`] is what an HTTP layer calls: it reads the slot,
//! dispatches to the transition matching the slot's current state, and
//! returns a flat [`SlotView`]. Callers arrive already authenticated, with a
//! [`CapabilityContext`] describing who they are.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::TeeSheetConfig;
use crate::domain::capability::CapabilityContext;
use crate::domain::classify::BookingCategory;
use crate::domain::course::CourseId;
use crate::domain::package::{PackageLink, PackageLinkId};
use crate::domain::slot::{AnySlot, ReservationPolicy, SlotId, SlotInput, SlotKind, SlotView};
use crate::error::{Result, TeeTimeError};
use crate::matrix::{MatrixAggregator, SlotMatrix};
use crate::scheduler::ExpiryScheduler;
use crate::storage::Storage;

/// A registered package: both slots and the link between them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageView {
    pub link: PackageLink,
    pub primary: SlotView,
    pub connected: SlotView,
}

pub struct ReservationService<S: Storage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    config: TeeSheetConfig,
    policy: ReservationPolicy,
    matrix: MatrixAggregator<S>,
}

impl<S: Storage + 'static> ReservationService<S> {
    pub fn new(storage: Arc<S>, clock: Arc<dyn Clock>, config: TeeSheetConfig) -> Result<Self> {
        config.validate()?;
        let policy = ReservationPolicy::try_from(&config)?;
        let matrix = MatrixAggregator::new(storage.clone(), clock.clone(), &config)?;
        Ok(Self {
            storage,
            clock,
            config,
            policy,
            matrix,
        })
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn policy(&self) -> &ReservationPolicy {
        &self.policy
    }

    /// A scheduler sharing this service's repository, clock and configuration.
    pub fn scheduler(&self, shutdown_token: CancellationToken) -> Result<ExpiryScheduler<S>> {
        ExpiryScheduler::new(
            self.storage.clone(),
            self.clock.clone(),
            self.config.clone(),
            shutdown_token,
        )
    }

    /// Place a hold on an available slot.
    #[tracing::instrument(
        skip(self, ctx),
        fields(slot_id = %slot_id, user_id = %ctx.user_id, role = ctx.role.as_str())
    )]
    pub async fn hold(&self, slot_id: SlotId, ctx: &CapabilityContext) -> Result<SlotView> {
        let now = self.clock.now();
        match self.storage.get_slot(slot_id).await? {
            AnySlot::Available(slot) => {
                let held = slot.hold(ctx, now, &self.policy, self.storage.as_ref()).await?;
                Ok(SlotView::from(&held))
            }
            other => Err(not_in_state(&other, "hold")),
        }
    }

    /// Confirm a held slot.
    #[tracing::instrument(
        skip(self, ctx),
        fields(slot_id = %slot_id, user_id = %ctx.user_id, role = ctx.role.as_str())
    )]
    pub async fn confirm(&self, slot_id: SlotId, ctx: &CapabilityContext) -> Result<SlotView> {
        let now = self.clock.now();
        match self.storage.get_slot(slot_id).await? {
            AnySlot::Held(slot) => {
                let confirmed = slot
                    .confirm(ctx, now, &self.policy, self.storage.as_ref())
                    .await?;
                Ok(SlotView::from(&confirmed))
            }
            other => Err(not_in_state(&other, "confirm")),
        }
    }

    /// Give up a hold, returning the slot to Available.
    #[tracing::instrument(
        skip(self, ctx),
        fields(slot_id = %slot_id, user_id = %ctx.user_id, role = ctx.role.as_str())
    )]
    pub async fn release(&self, slot_id: SlotId, ctx: &CapabilityContext) -> Result<SlotView> {
        match self.storage.get_slot(slot_id).await? {
            AnySlot::Held(slot) => {
                let released = slot.release(ctx, self.storage.as_ref()).await?;
                Ok(SlotView::from(&released))
            }
            other => Err(not_in_state(&other, "release")),
        }
    }

    pub async fn slot(&self, slot_id: SlotId) -> Result<SlotView> {
        let slot = self.storage.get_slot(slot_id).await?;
        Ok(SlotView::from(&slot))
    }

    /// Availability grid. `window_days` defaults to the configured window.
    pub async fn matrix(
        &self,
        category: BookingCategory,
        kind: Option<SlotKind>,
        window_days: Option<u32>,
    ) -> Result<Arc<SlotMatrix>> {
        let window_days = window_days.unwrap_or(self.config.matrix_window_days);
        self.matrix.build_matrix(category, kind, window_days).await
    }

    /// Register a new bookable slot on a known course.
    #[tracing::instrument(
        skip(self, input),
        fields(course_id = %input.course_id, date = %input.date, time = %input.time)
    )]
    pub async fn create_slot(&self, input: SlotInput) -> Result<SlotView> {
        let data = input.into_data(SlotId(Uuid::new_v4()))?;
        self.ensure_course(&data.course_id).await?;

        let slot = self.storage.create_slot(data).await?;
        tracing::info!(slot_id = %slot.data.id, "Slot registered");
        Ok(SlotView::from(&slot))
    }

    /// Register two package slots and link them.
    ///
    /// Both slots are stored with the package kind whatever the input says.
    #[tracing::instrument(skip_all)]
    pub async fn register_package(
        &self,
        primary: SlotInput,
        connected: SlotInput,
        accommodation_note: String,
    ) -> Result<PackageView> {
        let primary = SlotInput {
            kind: SlotKind::Package,
            ..primary
        }
        .into_data(SlotId(Uuid::new_v4()))?;
        let connected = SlotInput {
            kind: SlotKind::Package,
            ..connected
        }
        .into_data(SlotId(Uuid::new_v4()))?;
        self.ensure_course(&primary.course_id).await?;
        self.ensure_course(&connected.course_id).await?;

        let link = PackageLink {
            id: PackageLinkId(Uuid::new_v4()),
            primary_slot_id: primary.id,
            connected_slot_id: connected.id,
            accommodation_note,
            created_at: self.clock.now(),
        };

        let (primary, connected, link) =
            self.storage.create_package(primary, connected, link).await?;
        tracing::info!(
            link_id = %link.id,
            primary_slot_id = %primary.data.id,
            connected_slot_id = %connected.data.id,
            "Package registered"
        );

        Ok(PackageView {
            link,
            primary: SlotView::from(&primary),
            connected: SlotView::from(&connected),
        })
    }

    /// The package link a slot belongs to, if any.
    pub async fn package_for(&self, slot_id: SlotId) -> Result<Option<PackageLink>> {
        // Distinguish an unknown slot from an unlinked one
        self.storage.get_slot(slot_id).await?;
        self.storage.get_package_link_for_slot(slot_id).await
    }

    /// Remove a package link. Both slots keep their current state.
    #[tracing::instrument(skip(self), fields(link_id = %link_id))]
    pub async fn dissolve_package(&self, link_id: PackageLinkId) -> Result<()> {
        self.storage.dissolve_package_link(link_id).await?;
        tracing::info!("Package link dissolved");
        Ok(())
    }

    async fn ensure_course(&self, course_id: &CourseId) -> Result<()> {
        match self.storage.get_course(*course_id).await? {
            Some(_) => Ok(()),
            None => Err(TeeTimeError::InvalidInput(format!(
                "Unknown golf course: {}",
                **course_id
            ))),
        }
    }
}

/// The slot exists but isn't in the state the operation starts from.
fn not_in_state(slot: &AnySlot, action: &'static str) -> TeeTimeError {
    tracing::warn!(
        slot_id = %slot.id(),
        status = slot.status().as_str(),
        action,
        "Slot not in the required state"
    );
    TeeTimeError::Conflict(slot.id())
}
