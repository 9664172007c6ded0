//! Error types for the reservation core.

use thiserror::Error;

use crate::domain::capability::UserId;
use crate::domain::package::PackageLinkId;
use crate::domain::slot::SlotId;

/// Result type alias using the teesheet error type.
pub type Result<T> = std::result::Result<T, TeeTimeError>;

/// Main error type for the reservation core.
///
/// Every variant except [`TeeTimeError::Other`] is recoverable by the caller:
/// re-read the slot and retry the whole user action.
#[derive(Error, Debug)]
pub enum TeeTimeError {
    /// Slot id unknown to the repository
    #[error("Slot not found: {0}")]
    SlotNotFound(SlotId),

    /// Package link id unknown to the repository
    #[error("Package link not found: {0}")]
    PackageNotFound(PackageLinkId),

    /// The conditional update lost a race, or the slot was not in the
    /// state the operation requires. Never retried by the core.
    #[error("Slot no longer available: {0}")]
    Conflict(SlotId),

    /// The permission gate rejected the caller for this slot
    #[error("User {user_id} may not {action} slot {slot_id}")]
    Forbidden {
        slot_id: SlotId,
        user_id: UserId,
        action: &'static str,
    },

    /// Confirmation attempted after the hold window elapsed
    #[error("Hold on slot {0} has expired")]
    Expired(SlotId),

    /// Hold attempted on a slot whose date is already behind today
    #[error("Slot {0} is in the past and cannot be held")]
    SlotInPast(SlotId),

    /// A time-driven transition (expire, complete, archive) was attempted
    /// before its guard holds
    #[error("Cannot {transition} slot {slot_id} yet")]
    NotDue {
        slot_id: SlotId,
        transition: &'static str,
    },

    /// Malformed date/time/player count or other rejected input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Systemic failure (storage unreachable, driver error, ...)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TeeTimeError {
    /// True for failures that say nothing about the slot itself and should
    /// stop a sweep until the next tick.
    pub fn is_systemic(&self) -> bool {
        matches!(self, TeeTimeError::Other(_))
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TeeTimeError::SlotNotFound(_) | TeeTimeError::PackageNotFound(_) => "not_found",
            TeeTimeError::Conflict(_) => "conflict",
            TeeTimeError::Forbidden { .. } => "forbidden",
            TeeTimeError::Expired(_) => "expired",
            TeeTimeError::SlotInPast(_) => "in_past",
            TeeTimeError::NotDue { .. } => "not_due",
            TeeTimeError::InvalidInput(_) => "invalid_input",
            TeeTimeError::Other(_) => "systemic",
        }
    }
}
