//! Connection audit background job.
//!
//! Runs the heartbeat liveness audit on a short interval, independent of
//! the full maintenance sweep, so disconnects are noticed promptly.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use crate::maintenance::liveness;
use std::time::Duration;
use tracing::info;

pub struct ConnectionAuditJob {
    interval_minutes: u64,
    venue_page_size: usize,
}

impl ConnectionAuditJob {
    pub fn new(interval_minutes: u64, venue_page_size: usize) -> Self {
        Self {
            interval_minutes,
            venue_page_size,
        }
    }
}

impl BackgroundJob for ConnectionAuditJob {
    fn id(&self) -> &'static str {
        "connection_audit"
    }

    fn name(&self) -> &'static str {
        "Connection Audit"
    }

    fn description(&self) -> &'static str {
        "Classify venue player connections as live or stale by heartbeat age"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::every(Duration::from_secs(self.interval_minutes * 60))
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let report = liveness::audit_all(
            &*ctx.store,
            &ctx.locks,
            self.venue_page_size,
            chrono::Utc::now(),
        );

        if report.transitions() > 0 {
            info!(
                "Connection audit: {} venues audited, {} disconnected, {} reconnected",
                report.audited, report.disconnected, report.reconnected
            );
        }

        if report.errors.is_empty() {
            Ok(())
        } else {
            Err(JobError::ExecutionFailed(report.errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_metadata_and_schedule() {
        let job = ConnectionAuditJob::new(1, 200);
        assert_eq!(job.id(), "connection_audit");
        assert_eq!(job.schedule().interval, Duration::from_secs(60));
        assert!(!job.schedule().on_startup);
    }
}
