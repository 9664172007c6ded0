//! State transitions for tee-time slots using the typestate pattern.
//!
//! Each transition consumes a slot in its pre-state, evaluates its guard
//! against that same pre-read state, and hands the next-state slot to the
//! repository as exactly one conditional update:
//!
//! ```text
//! Slot<Available> ──hold()──> Slot<Held> ──confirm()──> Slot<Confirmed>
//!       │                        │                          │
//!       │                        │                          └──complete()──> Slot<Completed>
//!       │                        ├──release()──> Slot<Available>
//!       │                        └──expire()───> Slot<Available>
//!       └──archive()──> Slot<Cancelled>
//! ```
//!
//! A transition whose conditional update loses a race fails with
//! [`TeeTimeError::Conflict`] and is never retried here: the caller re-reads
//! and decides.
//!
//! # Guards
//!
//! | Transition | Guard |
//! |---|---|
//! | hold | role may reserve; slot date is today or later |
//! | confirm | caller may confirm for the holder; hold not expired |
//! | release | caller is the holder or may release any hold |
//! | expire | hold expired |
//! | complete | scheduled time has passed |
//! | archive | slot date is before today |
//!
//! A hold is expired once strictly more than the hold TTL has elapsed since
//! `held_at`. Confirming an expired hold releases it before reporting
//! [`TeeTimeError::Expired`], so the slot does not wait for the next sweep.

use chrono::{DateTime, FixedOffset, Offset, TimeDelta, Utc};
use metrics::counter;

use crate::config::TeeSheetConfig;
use crate::domain::capability::CapabilityContext;
use crate::domain::classify;
use crate::error::{Result, TeeTimeError};
use crate::storage::{Storage, UpdateOutcome};

use super::state::{
    AnySlot, Available, Cancelled, Completed, Confirmed, Held, Slot, SlotState, SlotStatus,
};

/// Time rules the transitions evaluate their guards with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationPolicy {
    /// How long a hold stays valid
    pub hold_ttl: TimeDelta,
    /// The system's configured time zone
    pub offset: FixedOffset,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        ReservationPolicy {
            hold_ttl: TimeDelta::minutes(10),
            offset: Utc.fix(),
        }
    }
}

impl TryFrom<&TeeSheetConfig> for ReservationPolicy {
    type Error = TeeTimeError;

    fn try_from(config: &TeeSheetConfig) -> Result<Self> {
        let hold_ttl = i64::try_from(config.hold_ttl_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .ok_or_else(|| {
                TeeTimeError::InvalidInput(format!(
                    "hold_ttl_ms out of range: {}",
                    config.hold_ttl_ms
                ))
            })?;

        Ok(ReservationPolicy {
            hold_ttl,
            offset: config.utc_offset()?,
        })
    }
}

/// Submit `next` as one conditional update and record the outcome.
async fn apply<S, T>(
    storage: &S,
    next: Slot<T>,
    expected: SlotStatus,
    transition: &'static str,
) -> Result<Slot<T>>
where
    S: Storage + ?Sized,
    T: SlotState + Clone,
    AnySlot: From<Slot<T>>,
{
    let slot_id = next.data.id;

    match storage.conditional_update(&next, expected).await {
        Ok(UpdateOutcome::Applied { version }) => {
            counter!(
                "teesheet_transitions_total",
                "transition" => transition,
                "outcome" => "applied"
            )
            .increment(1);
            tracing::info!(
                slot_id = %slot_id,
                transition,
                from = expected.as_str(),
                version,
                "Slot transition applied"
            );
            Ok(Slot { version, ..next })
        }
        Ok(UpdateOutcome::Conflict) => {
            counter!(
                "teesheet_transitions_total",
                "transition" => transition,
                "outcome" => "conflict"
            )
            .increment(1);
            tracing::warn!(
                slot_id = %slot_id,
                transition,
                expected_status = expected.as_str(),
                expected_version = next.version,
                "Slot changed since it was read, transition not applied"
            );
            Err(TeeTimeError::Conflict(slot_id))
        }
        Ok(UpdateOutcome::NotFound) => {
            counter!(
                "teesheet_transitions_total",
                "transition" => transition,
                "outcome" => "not_found"
            )
            .increment(1);
            Err(TeeTimeError::SlotNotFound(slot_id))
        }
        Err(e) => {
            counter!(
                "teesheet_transitions_total",
                "transition" => transition,
                "outcome" => e.kind()
            )
            .increment(1);
            tracing::error!(
                slot_id = %slot_id,
                transition,
                error = %e,
                "Conditional update failed"
            );
            Err(e)
        }
    }
}

/// Count a transition refused by its guard, labelled with the error kind.
fn rejected(transition: &'static str, err: TeeTimeError) -> TeeTimeError {
    counter!(
        "teesheet_transitions_total",
        "transition" => transition,
        "outcome" => err.kind()
    )
    .increment(1);
    err
}

impl Slot<Available> {
    /// Place an exclusive hold for the caller.
    pub async fn hold<S: Storage + ?Sized>(
        self,
        ctx: &CapabilityContext,
        now: DateTime<Utc>,
        policy: &ReservationPolicy,
        storage: &S,
    ) -> Result<Slot<Held>> {
        if !ctx.can_reserve() {
            return Err(rejected(
                "hold",
                TeeTimeError::Forbidden {
                    slot_id: self.data.id,
                    user_id: ctx.user_id.clone(),
                    action: "hold",
                },
            ));
        }
        if !classify::is_future_or_today(self.data.date, now, policy.offset) {
            return Err(rejected("hold", TeeTimeError::SlotInPast(self.data.id)));
        }

        let slot = Slot {
            data: self.data,
            version: self.version,
            state: Held {
                holder: ctx.actor(),
                held_at: now,
            },
        };
        apply(storage, slot, SlotStatus::Available, "hold").await
    }

    /// Retire a slot nobody booked once its date is behind today.
    pub async fn archive<S: Storage + ?Sized>(
        self,
        now: DateTime<Utc>,
        policy: &ReservationPolicy,
        storage: &S,
    ) -> Result<Slot<Cancelled>> {
        if classify::is_future_or_today(self.data.date, now, policy.offset) {
            return Err(rejected(
                "archive",
                TeeTimeError::NotDue {
                    slot_id: self.data.id,
                    transition: "archive",
                },
            ));
        }

        let slot = Slot {
            data: self.data,
            version: self.version,
            state: Cancelled { cancelled_at: now },
        };
        apply(storage, slot, SlotStatus::Available, "archive").await
    }
}

impl Slot<Held> {
    /// True once strictly more than the hold TTL has passed since `held_at`.
    pub fn is_expired(&self, now: DateTime<Utc>, policy: &ReservationPolicy) -> bool {
        now - self.state.held_at > policy.hold_ttl
    }

    /// Confirm the hold on behalf of the caller.
    ///
    /// The permission gate is checked first, so a caller who could never
    /// confirm gets `Forbidden` and leaves an expired hold for the sweep.
    pub async fn confirm<S: Storage + ?Sized>(
        self,
        ctx: &CapabilityContext,
        now: DateTime<Utc>,
        policy: &ReservationPolicy,
        storage: &S,
    ) -> Result<Slot<Confirmed>> {
        if !ctx.can_confirm(&self.state.holder) {
            return Err(rejected(
                "confirm",
                TeeTimeError::Forbidden {
                    slot_id: self.data.id,
                    user_id: ctx.user_id.clone(),
                    action: "confirm",
                },
            ));
        }

        if self.is_expired(now, policy) {
            let slot_id = self.data.id;
            tracing::warn!(
                slot_id = %slot_id,
                user_id = %ctx.user_id,
                held_at = %self.state.held_at,
                "Confirm attempted on expired hold, releasing slot"
            );

            match self.expire(now, policy, storage).await {
                Ok(_) => {}
                // Someone else already moved the slot on
                Err(TeeTimeError::Conflict(_)) | Err(TeeTimeError::SlotNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            return Err(rejected("confirm", TeeTimeError::Expired(slot_id)));
        }

        let slot = Slot {
            data: self.data,
            version: self.version,
            state: Confirmed {
                holder: self.state.holder,
                held_at: self.state.held_at,
                confirmer: ctx.actor(),
                confirmed_at: now,
            },
        };
        apply(storage, slot, SlotStatus::Held, "confirm").await
    }

    /// Explicitly give up the hold.
    pub async fn release<S: Storage + ?Sized>(
        self,
        ctx: &CapabilityContext,
        storage: &S,
    ) -> Result<Slot<Available>> {
        if !ctx.can_release(&self.state.holder) {
            return Err(rejected(
                "release",
                TeeTimeError::Forbidden {
                    slot_id: self.data.id,
                    user_id: ctx.user_id.clone(),
                    action: "release",
                },
            ));
        }

        let slot = Slot {
            data: self.data,
            version: self.version,
            state: Available {},
        };
        apply(storage, slot, SlotStatus::Held, "release").await
    }

    /// System-initiated release of a stale hold.
    pub async fn expire<S: Storage + ?Sized>(
        self,
        now: DateTime<Utc>,
        policy: &ReservationPolicy,
        storage: &S,
    ) -> Result<Slot<Available>> {
        if !self.is_expired(now, policy) {
            return Err(rejected(
                "expire",
                TeeTimeError::NotDue {
                    slot_id: self.data.id,
                    transition: "expire",
                },
            ));
        }

        let slot = Slot {
            data: self.data,
            version: self.version,
            state: Available {},
        };
        apply(storage, slot, SlotStatus::Held, "expire").await
    }
}

impl Slot<Confirmed> {
    /// Mark the round as played once its scheduled time has passed.
    pub async fn complete<S: Storage + ?Sized>(
        self,
        now: DateTime<Utc>,
        policy: &ReservationPolicy,
        storage: &S,
    ) -> Result<Slot<Completed>> {
        if self.data.scheduled_at(policy.offset) > now {
            return Err(rejected(
                "complete",
                TeeTimeError::NotDue {
                    slot_id: self.data.id,
                    transition: "complete",
                },
            ));
        }

        let slot = Slot {
            data: self.data,
            version: self.version,
            state: Completed {
                holder: self.state.holder,
                held_at: self.state.held_at,
                confirmer: self.state.confirmer,
                confirmed_at: self.state.confirmed_at,
                completed_at: now,
            },
        };
        apply(storage, slot, SlotStatus::Confirmed, "complete").await
    }
}
