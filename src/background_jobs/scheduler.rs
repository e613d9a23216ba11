use super::context::JobContext;
use super::job::{BackgroundJob, JobError, JobSchedule, ShutdownBehavior};
use crate::venue_store::{JobRunStatus, JobScheduleState, VenueStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Fallback wake-up interval when no job is due sooner.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Drives registered background jobs on their interval schedules.
///
/// Next-run times are persisted through the store so an interval survives a
/// restart instead of firing immediately every boot.
pub struct JobScheduler {
    jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    running: HashSet<String>,
    handles: HashMap<String, JoinHandle<()>>,
    store: Arc<dyn VenueStore>,
    shutdown_token: CancellationToken,
    job_context: JobContext,
    finished_receiver: tokio::sync::mpsc::UnboundedReceiver<String>,
    finished_sender: tokio::sync::mpsc::UnboundedSender<String>,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn VenueStore>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
    ) -> Self {
        let (finished_sender, finished_receiver) = tokio::sync::mpsc::unbounded_channel();
        Self {
            jobs: HashMap::new(),
            running: HashSet::new(),
            handles: HashMap::new(),
            store,
            shutdown_token,
            job_context,
            finished_receiver,
            finished_sender,
        }
    }

    /// Registers a job with the scheduler.
    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registering job: {} - {}", job.id(), job.description());
        self.jobs.insert(job.id().to_string(), job);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Main scheduler loop. Returns once shutdown is requested and the
    /// wait-for-completion jobs have drained.
    pub async fn run(&mut self) {
        info!("Starting job scheduler with {} registered jobs", self.job_count());

        match self.store.mark_stale_jobs_failed() {
            Ok(count) if count > 0 => {
                info!("Marked {} stale jobs as failed from previous run", count);
            }
            Ok(_) => {}
            Err(e) => error!("Failed to mark stale jobs: {}", e),
        }

        let startup_jobs: Vec<String> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.schedule().on_startup)
            .map(|(id, _)| id.clone())
            .collect();
        for job_id in startup_jobs {
            self.spawn_job(&job_id, "startup");
        }

        // Seed next-run bookkeeping for jobs that have never run, so their
        // first interval starts counting from scheduler start
        for (job_id, job) in &self.jobs {
            match self.store.get_schedule_state(job_id) {
                Ok(None) => {
                    let next_run = chrono::Utc::now()
                        + chrono::Duration::from_std(job.schedule().interval).unwrap_or_default();
                    if let Err(e) = self.store.update_schedule_state(&JobScheduleState {
                        job_id: job_id.clone(),
                        next_run_at: next_run,
                        last_run_at: None,
                    }) {
                        error!("Failed to seed schedule state for {}: {}", job_id, e);
                    }
                }
                Ok(Some(_)) => {}
                Err(e) => error!("Failed to read schedule state for {}: {}", job_id, e),
            }
        }

        loop {
            let sleep_duration = self.time_until_next_due();
            debug!("Scheduler sleeping for {:?}", sleep_duration);

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs();
                }
                Some(job_id) = self.finished_receiver.recv() => {
                    self.running.remove(&job_id);
                    self.handles.remove(&job_id);
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    fn time_until_next_due(&self) -> Duration {
        let now = chrono::Utc::now();
        let mut min_duration = IDLE_CHECK_INTERVAL;

        for (job_id, job) in &self.jobs {
            if self.running.contains(job_id) {
                continue;
            }
            let next_run = self.next_run_time(job_id, job.schedule());
            if next_run <= now {
                return Duration::from_secs(0);
            }
            let until = (next_run - now).to_std().unwrap_or(Duration::from_secs(1));
            if until < min_duration {
                min_duration = until;
            }
        }

        min_duration
    }

    fn next_run_time(&self, job_id: &str, schedule: JobSchedule) -> chrono::DateTime<chrono::Utc> {
        match self.store.get_schedule_state(job_id) {
            Ok(Some(state)) => state.next_run_at,
            // No recorded state: due one interval from now, not immediately
            _ => chrono::Utc::now()
                + chrono::Duration::from_std(schedule.interval).unwrap_or_default(),
        }
    }

    fn run_due_jobs(&mut self) {
        let now = chrono::Utc::now();
        let due: Vec<String> = self
            .jobs
            .iter()
            .filter(|(job_id, job)| {
                !self.running.contains(*job_id)
                    && self.next_run_time(job_id, job.schedule()) <= now
            })
            .map(|(id, _)| id.clone())
            .collect();

        for job_id in due {
            self.spawn_job(&job_id, "schedule");
        }
    }

    fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let Some(job) = self.jobs.get(job_id).cloned() else {
            error!("Attempted to spawn unknown job: {}", job_id);
            return;
        };

        let run_id = match self.store.record_job_start(job_id, triggered_by) {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to record job start for {}: {}", job_id, e);
                return;
            }
        };

        info!(
            "Starting job: {} (run_id: {}, triggered_by: {})",
            job_id, run_id, triggered_by
        );
        self.running.insert(job_id.to_string());

        // Push next_run_at forward before the job starts so a long run never
        // double-fires
        let next_run = chrono::Utc::now()
            + chrono::Duration::from_std(job.schedule().interval).unwrap_or_default();
        if let Err(e) = self.store.update_schedule_state(&JobScheduleState {
            job_id: job_id.to_string(),
            next_run_at: next_run,
            last_run_at: None,
        }) {
            error!("Failed to update schedule state for {}: {}", job_id, e);
        }

        let cancel_token = self.shutdown_token.child_token();
        let ctx = JobContext::new(
            cancel_token,
            Arc::clone(&self.job_context.store),
            Arc::clone(&self.job_context.locks),
        );

        let store = Arc::clone(&self.store);
        let job_id_owned = job_id.to_string();
        let finished = self.finished_sender.clone();

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            let elapsed = start_time.elapsed();

            let (status, error_msg) = match result {
                Ok(Ok(())) => {
                    info!("Job {} completed in {:?}", job_id_owned, elapsed);
                    (JobRunStatus::Completed, None)
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    (JobRunStatus::Failed, Some("Cancelled".to_string()))
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(e.to_string()))
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    (JobRunStatus::Failed, Some(format!("Task panic: {}", e)))
                }
            };

            if let Err(e) = store.record_job_finish(run_id, status, error_msg) {
                error!("Failed to record finish of job {}: {}", job_id_owned, e);
            }
            if let Err(e) = store.update_schedule_state(&JobScheduleState {
                job_id: job_id_owned.clone(),
                next_run_at: next_run,
                last_run_at: Some(chrono::Utc::now()),
            }) {
                error!("Failed to stamp last run of job {}: {}", job_id_owned, e);
            }

            let _ = finished.send(job_id_owned);
        });

        self.handles.insert(job_id.to_string(), handle);
    }

    async fn shutdown(&mut self) {
        let mut waited = Vec::new();
        for (job_id, handle) in self.handles.drain() {
            let behavior = self
                .jobs
                .get(&job_id)
                .map(|j| j.shutdown_behavior())
                .unwrap_or_default();
            match behavior {
                ShutdownBehavior::Cancellable => handle.abort(),
                ShutdownBehavior::WaitForCompletion => waited.push((job_id, handle)),
            }
        }

        for (job_id, handle) in waited {
            debug!("Waiting for job {} to finish before shutdown", job_id);
            if let Err(e) = handle.await {
                error!("Job {} ended abnormally during shutdown: {}", job_id, e);
            }
        }
        self.running.clear();
    }
}
