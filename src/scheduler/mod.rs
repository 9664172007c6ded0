//! Background sweeps that move slots along on time alone.
//!
//! The [`ExpiryScheduler`] runs three independent periodic sweeps:
//! - release holds that went stale (every minute by default)
//! - complete confirmed slots whose tee time has passed (every 5 minutes)
//! - archive available slots dated before today (every hour)
//!
//! Each sweep invokes the same slot transitions a human caller would, so
//! every write is a conditional update and a sweep can safely race live
//! traffic. A slot that changes under a sweep is logged and skipped. Only a
//! systemic failure stops a sweep early, and the next tick tries again.
//!
//! The sweep functions are public so they can be driven directly with a
//! mock clock instead of waiting on timers.

pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::TeeSheetConfig;
use crate::domain::classify;
use crate::domain::slot::{ReservationPolicy, SlotId, SlotStatus};
use crate::error::{Result, TeeTimeError};
use crate::storage::{SlotFilter, Storage};

pub use types::{SweepKind, SweepReport};

/// Runs the periodic sweeps against a slot repository.
pub struct ExpiryScheduler<S: Storage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    config: TeeSheetConfig,
    policy: ReservationPolicy,
    shutdown_token: CancellationToken,
}

impl<S: Storage + 'static> ExpiryScheduler<S> {
    /// Create a scheduler. The configuration is validated up front.
    pub fn new(
        storage: Arc<S>,
        clock: Arc<dyn Clock>,
        config: TeeSheetConfig,
        shutdown_token: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;
        let policy = ReservationPolicy::try_from(&config)?;
        Ok(Self {
            storage,
            clock,
            config,
            policy,
            shutdown_token,
        })
    }

    pub fn policy(&self) -> &ReservationPolicy {
        &self.policy
    }

    /// Run one sweep of the given kind.
    pub async fn sweep(&self, kind: SweepKind) -> Result<SweepReport> {
        match kind {
            SweepKind::Expiry => self.sweep_expired_holds().await,
            SweepKind::Completion => self.sweep_elapsed_confirmations().await,
            SweepKind::Archive => self.sweep_past_available().await,
        }
    }

    /// Release every hold whose TTL has elapsed.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_expired_holds(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = SweepReport::new(SweepKind::Expiry);

        let filter = SlotFilter::default().with_statuses([SlotStatus::Held]);
        let candidates = self.storage.query_slots(&filter).await?;

        for slot in candidates.into_iter().filter_map(|s| s.into_held()) {
            report.scanned += 1;
            if !slot.is_expired(now, &self.policy) {
                continue;
            }
            let slot_id = slot.data.id;
            let result = slot
                .expire(now, &self.policy, self.storage.as_ref())
                .await
                .map(|_| ());
            record(&mut report, slot_id, result)?;
        }

        Ok(finish(report, started))
    }

    /// Complete every confirmed slot whose scheduled time is not after now.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_elapsed_confirmations(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = SweepReport::new(SweepKind::Completion);

        // Anything dated after today can't have started yet
        let today = classify::local_today(now, self.policy.offset);
        let filter = SlotFilter::default()
            .with_statuses([SlotStatus::Confirmed])
            .with_dates(None, today.succ_opt());
        let candidates = self.storage.query_slots(&filter).await?;

        for slot in candidates.into_iter().filter_map(|s| s.into_confirmed()) {
            report.scanned += 1;
            if slot.data.scheduled_at(self.policy.offset) > now {
                continue;
            }
            let slot_id = slot.data.id;
            let result = slot
                .complete(now, &self.policy, self.storage.as_ref())
                .await
                .map(|_| ());
            record(&mut report, slot_id, result)?;
        }

        Ok(finish(report, started))
    }

    /// Archive every available slot dated strictly before today.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_past_available(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = SweepReport::new(SweepKind::Archive);

        let today = classify::local_today(now, self.policy.offset);
        let filter = SlotFilter::default()
            .with_statuses([SlotStatus::Available])
            .with_dates(None, Some(today));
        let candidates = self.storage.query_slots(&filter).await?;

        for slot in candidates.into_iter().filter_map(|s| s.into_available()) {
            report.scanned += 1;
            let slot_id = slot.data.id;
            let result = slot
                .archive(now, &self.policy, self.storage.as_ref())
                .await
                .map(|_| ());
            record(&mut report, slot_id, result)?;
        }

        Ok(finish(report, started))
    }

    fn interval_ms(&self, kind: SweepKind) -> u64 {
        match kind {
            SweepKind::Expiry => self.config.expiry_sweep_interval_ms,
            SweepKind::Completion => self.config.completion_sweep_interval_ms,
            SweepKind::Archive => self.config.archive_sweep_interval_ms,
        }
    }

    /// Run all three sweeps on their intervals until the shutdown token is
    /// cancelled.
    ///
    /// Shutdown stops new sweeps from being scheduled; a sweep already in
    /// flight runs to completion before this returns.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        tracing::info!("Expiry scheduler starting");

        let handles: Vec<_> = SweepKind::ALL
            .into_iter()
            .map(|kind| {
                let scheduler = self.clone();
                tokio::spawn(async move { scheduler.sweep_loop(kind).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Sweep task terminated abnormally");
            }
        }

        tracing::info!("Expiry scheduler stopped");
        Ok(())
    }

    async fn sweep_loop(&self, kind: SweepKind) {
        let interval_ms = self.interval_ms(kind);
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(sweep = %kind, interval_ms, "Sweep loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep(kind).await {
                        // Retried on the next tick, never in a tight loop
                        tracing::error!(sweep = %kind, error = %e, "Sweep halted early");
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    tracing::info!(sweep = %kind, "Shutting down sweep loop");
                    break;
                }
            }
        }
    }
}

/// Tally one per-slot outcome. Systemic errors abort the sweep.
fn record(report: &mut SweepReport, slot_id: SlotId, result: Result<()>) -> Result<()> {
    let sweep = report.sweep.as_str();
    let outcome = match result {
        Ok(()) => {
            report.transitioned += 1;
            "transitioned"
        }
        Err(TeeTimeError::Conflict(_)) => {
            report.conflicts += 1;
            tracing::debug!(slot_id = %slot_id, sweep, "Slot changed during sweep, skipping");
            "conflict"
        }
        Err(e) if e.is_systemic() => {
            counter!("teesheet_sweep_slots_total", "sweep" => sweep, "outcome" => e.kind())
                .increment(1);
            return Err(e);
        }
        Err(e) => {
            report.failed += 1;
            tracing::warn!(
                slot_id = %slot_id,
                sweep,
                kind = e.kind(),
                error = %e,
                "Failed to transition slot, skipping"
            );
            e.kind()
        }
    };
    counter!("teesheet_sweep_slots_total", "sweep" => sweep, "outcome" => outcome).increment(1);
    Ok(())
}

fn finish(report: SweepReport, started: Instant) -> SweepReport {
    histogram!("teesheet_sweep_duration_seconds", "sweep" => report.sweep.as_str())
        .record(started.elapsed().as_secs_f64());

    if report.transitioned > 0 || report.conflicts > 0 || report.failed > 0 {
        tracing::info!(
            sweep = %report.sweep,
            scanned = report.scanned,
            transitioned = report.transitioned,
            conflicts = report.conflicts,
            failed = report.failed,
            "Sweep finished"
        );
    } else {
        tracing::debug!(
            sweep = %report.sweep,
            scanned = report.scanned,
            "Sweep finished, nothing to do"
        );
    }
    report
}
