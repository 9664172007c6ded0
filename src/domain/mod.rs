//! Core domain types for the reservation core.
//!
//! This module contains pure domain types with no persistence dependencies:
//! - Classification rules for time buckets and booking categories
//! - Caller roles and the permission gate
//! - Golf courses and package links
//! - Slot typestate machine

pub mod capability;
pub mod classify;
pub mod course;
pub mod package;
pub mod slot;
