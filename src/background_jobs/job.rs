use super::context::JobContext;
use std::time::Duration;

/// When a job should run.
#[derive(Debug, Clone, Copy)]
pub struct JobSchedule {
    /// Fixed interval between runs.
    pub interval: Duration,
    /// Whether the job also runs once at scheduler startup.
    pub on_startup: bool,
}

impl JobSchedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            on_startup: false,
        }
    }

    pub fn with_startup_run(mut self) -> Self {
        self.on_startup = true;
        self
    }
}

/// How a job is handled during server shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutdownBehavior {
    /// Job can be cancelled immediately
    #[default]
    Cancellable,
    /// Wait for the job to complete before shutdown
    WaitForCompletion,
}

/// Errors that can occur during job execution.
#[derive(Debug)]
pub enum JobError {
    ExecutionFailed(String),
    Cancelled,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Cancelled => write!(f, "Job was cancelled"),
        }
    }
}

impl std::error::Error for JobError {}

/// Trait for background jobs.
///
/// Jobs execute synchronously in a blocking context. Long-running work
/// should periodically check `ctx.is_cancelled()` and return early with
/// `JobError::Cancelled`.
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// What this job does.
    fn description(&self) -> &'static str;

    /// When this job runs.
    fn schedule(&self) -> JobSchedule;

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    /// Execute the job. Called from a blocking context via `spawn_blocking`.
    fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}
