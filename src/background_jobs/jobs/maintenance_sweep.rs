//! Maintenance sweep background job.
//!
//! Runs the full maintenance sweep (liveness audit, scheduled events,
//! retention cleanup, integrity check) on a fixed interval and persists
//! each run's summary to the job audit log.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior},
};
use crate::maintenance::{MaintenanceSweep, SweepSettings};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

pub struct MaintenanceSweepJob {
    interval_minutes: u64,
    settings: SweepSettings,
}

impl MaintenanceSweepJob {
    pub fn new(interval_minutes: u64, settings: SweepSettings) -> Self {
        Self {
            interval_minutes,
            settings,
        }
    }
}

impl BackgroundJob for MaintenanceSweepJob {
    fn id(&self) -> &'static str {
        "maintenance_sweep"
    }

    fn name(&self) -> &'static str {
        "Maintenance Sweep"
    }

    fn description(&self) -> &'static str {
        "Audit connections, execute scheduled events, clean up expired data and check integrity"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::every(Duration::from_secs(self.interval_minutes * 60)).with_startup_run()
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        // A half-finished sweep is harmless; the next run picks up the rest
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let started = Instant::now();
        let sweep = MaintenanceSweep::new(
            Arc::clone(&ctx.store),
            Arc::clone(&ctx.locks),
            self.settings.clone(),
        );
        let summary = sweep.run();

        let details = serde_json::json!({
            "status": summary.status(),
            "results": summary,
        });
        if let Err(e) = ctx.store.log_job_audit(
            self.id(),
            crate::venue_store::JobAuditEventType::Completed,
            Some(started.elapsed().as_millis() as i64),
            Some(&details),
            None,
        ) {
            warn!("Failed to persist sweep summary: {}", e);
        }

        Ok(())
    }
}
