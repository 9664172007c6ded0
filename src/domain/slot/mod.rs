//! Slot aggregate - domain model and state transitions.
//!
//! This module contains the core domain logic for tee-time slots:
//! - Slot types and states (typestate pattern)
//! - State transition methods and their guards
//! - Registration input and the read projection

pub mod state;
pub mod transitions;

// Re-export commonly used types
pub use state::*;
pub use transitions::ReservationPolicy;
