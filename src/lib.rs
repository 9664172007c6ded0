//! Tee-time reservation core.
//!
//! Golf-course operators publish bookable tee-time slots; staff hold, confirm
//! or release them. This crate owns the hard part: the slot lifecycle state
//! machine, the exclusive 10-minute hold that keeps two callers from booking
//! the same slot, the rules that classify a slot's time bucket and booking
//! category, and the availability matrix the dashboard renders.
//!
//! Races are settled by a single compare-and-swap primitive on the slot
//! repository; background sweeps release stale holds, complete played rounds
//! and archive unbooked past slots through the same transitions callers use.
//!
//! Slots are stored in memory by default, or in PostgreSQL with the
//! `postgres` feature.

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod matrix;
pub mod scheduler;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use clock::{Clock, MockClock, SystemClock};
pub use config::TeeSheetConfig;
pub use domain::capability::{AccountRole, Actor, Capability, CapabilityContext, TeamId, UserId};
pub use domain::classify::{BookingCategory, TimeBucket};
pub use domain::course::{CourseId, GolfCourse};
pub use domain::package::{PackageLink, PackageLinkId};
pub use domain::slot::*;
pub use error::{Result, TeeTimeError};
pub use matrix::{MatrixAggregator, MatrixCell, MatrixRow, SlotMatrix};
pub use scheduler::{ExpiryScheduler, SweepKind, SweepReport};
pub use service::{PackageView, ReservationService};
pub use storage::memory::InMemoryStorage;
#[cfg(feature = "postgres")]
pub use storage::postgres::{PoolProvider, PostgresStorage, TestDbPools};
pub use storage::{SlotFilter, Storage, UpdateOutcome};

/// Get the teesheet database migrator
///
/// Returns a migrator that can be run against a connection pool.
#[cfg(feature = "postgres")]
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
