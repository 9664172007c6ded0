//! Sweep identities and per-run reports.

use serde::Serialize;

/// One of the three periodic background sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    /// Held slots whose hold went stale go back to Available
    Expiry,
    /// Confirmed slots whose tee time has passed become Completed
    Completion,
    /// Available slots dated before today become Cancelled
    Archive,
}

impl SweepKind {
    pub const ALL: [SweepKind; 3] = [SweepKind::Expiry, SweepKind::Completion, SweepKind::Archive];

    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::Expiry => "expiry",
            SweepKind::Completion => "completion",
            SweepKind::Archive => "archive",
        }
    }
}

impl std::fmt::Display for SweepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single sweep run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sweep: SweepKind,
    /// Candidate slots read from the repository
    pub scanned: usize,
    /// Slots the sweep moved to their next state
    pub transitioned: usize,
    /// Slots that changed under the sweep before its update landed
    pub conflicts: usize,
    /// Slots skipped because of any other per-slot error
    pub failed: usize,
}

impl SweepReport {
    pub fn new(sweep: SweepKind) -> Self {
        Self {
            sweep,
            scanned: 0,
            transitioned: 0,
            conflicts: 0,
            failed: 0,
        }
    }

    /// Slots that were eligible but left for the next run.
    pub fn skipped(&self) -> usize {
        self.scanned
            .saturating_sub(self.transitioned + self.conflicts + self.failed)
    }
}
