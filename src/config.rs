//! Runtime configuration for the reservation core.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TeeTimeError};

/// Longest rolling window the matrix aggregator accepts.
pub const MAX_MATRIX_WINDOW_DAYS: u32 = 366;

/// Configuration for holds, sweeps and the availability matrix.
///
/// Deserializes with defaults for any missing field, so hosts can load a
/// partial document from their own config source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeeSheetConfig {
    /// How long a hold stays valid. A hold is expired once strictly more
    /// than this has elapsed since it was taken.
    pub hold_ttl_ms: u64,

    /// Offset of the system's configured time zone from UTC, in seconds.
    /// Calendar-date rules ("today", "in the past") are evaluated here.
    pub utc_offset_seconds: i32,

    /// Interval between sweeps that release stale holds
    pub expiry_sweep_interval_ms: u64,

    /// Interval between sweeps that complete elapsed confirmations
    pub completion_sweep_interval_ms: u64,

    /// Interval between sweeps that archive past available slots
    pub archive_sweep_interval_ms: u64,

    /// Default number of days covered by the availability matrix
    pub matrix_window_days: u32,

    /// How long a built matrix may be served from cache. Zero disables caching.
    pub matrix_cache_ttl_ms: u64,

    /// Maximum number of distinct matrix variants kept in cache
    pub matrix_cache_capacity: u64,
}

impl Default for TeeSheetConfig {
    fn default() -> Self {
        Self {
            hold_ttl_ms: 600_000,                // 10 minutes
            utc_offset_seconds: 0,
            expiry_sweep_interval_ms: 60_000,    // 1 minute
            completion_sweep_interval_ms: 300_000, // 5 minutes
            archive_sweep_interval_ms: 3_600_000, // 1 hour
            matrix_window_days: 90,
            matrix_cache_ttl_ms: 60_000,
            matrix_cache_capacity: 64,
        }
    }
}

impl TeeSheetConfig {
    /// The configured time zone as a fixed offset.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            TeeTimeError::InvalidInput(format!(
                "utc_offset_seconds out of range: {}",
                self.utc_offset_seconds
            ))
        })
    }

    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.utc_offset()?;

        let intervals = [
            ("hold_ttl_ms", self.hold_ttl_ms),
            ("expiry_sweep_interval_ms", self.expiry_sweep_interval_ms),
            ("completion_sweep_interval_ms", self.completion_sweep_interval_ms),
            ("archive_sweep_interval_ms", self.archive_sweep_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(TeeTimeError::InvalidInput(format!("{name} must be positive")));
        }

        if !(1..=MAX_MATRIX_WINDOW_DAYS).contains(&self.matrix_window_days) {
            return Err(TeeTimeError::InvalidInput(format!(
                "matrix_window_days must be within 1..={MAX_MATRIX_WINDOW_DAYS}, got {}",
                self.matrix_window_days
            )));
        }

        // The matrix may lag live state by at most one expiry sweep interval
        if self.matrix_cache_ttl_ms > self.expiry_sweep_interval_ms {
            return Err(TeeTimeError::InvalidInput(format!(
                "matrix_cache_ttl_ms ({}) exceeds expiry_sweep_interval_ms ({})",
                self.matrix_cache_ttl_ms, self.expiry_sweep_interval_ms
            )));
        }

        Ok(())
    }
}
