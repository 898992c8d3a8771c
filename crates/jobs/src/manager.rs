//! Job manager: background execution plus synchronous queries.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use genjobs_core::clock::unix_now;
use genjobs_core::{JobId, Settings};

use super::store::{JobError, JobRegistry, JobStats};
use super::types::{Job, JobKind, JobStatus};

/// Job manager configuration.
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    /// How long terminal jobs survive after their last update
    pub retention: Duration,
    /// How often the cleanup worker sweeps the registry
    pub cleanup_interval: Duration,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(2 * 60 * 60),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl JobManagerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            retention: settings.job_retention,
            cleanup_interval: settings.cleanup_interval,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

/// Handle given to a running executor.
#[derive(Debug, Clone)]
pub struct JobContext {
    id: JobId,
    registry: Arc<JobRegistry>,
}

impl JobContext {
    pub fn job_id(&self) -> JobId {
        self.id
    }

    /// Report intermediate progress (clamped to 99).
    ///
    /// Returns `false` when the value was ignored because it would not
    /// increase the stored progress.
    pub fn report_progress(&self, progress: u8) -> bool {
        self.registry.report_progress(self.id, progress, unix_now())
    }
}

/// Owns the job registry and runs each job's executor exactly once.
///
/// `create` spawns onto the ambient Tokio runtime and must be called from
/// within one.
#[derive(Debug, Clone)]
pub struct JobManager {
    registry: Arc<JobRegistry>,
    config: JobManagerConfig,
}

impl JobManager {
    pub fn new(config: JobManagerConfig) -> Self {
        Self::with_registry(config, Arc::new(JobRegistry::new()))
    }

    /// Build a manager over an existing registry.
    pub fn with_registry(config: JobManagerConfig, registry: Arc<JobRegistry>) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &JobManagerConfig {
        &self.config
    }

    /// Register a job and start its executor in the background.
    ///
    /// Returns the `pending` snapshot immediately; the executor is spawned,
    /// never awaited here.
    pub fn create<F, Fut>(
        &self,
        kind: JobKind,
        executor: F,
        params: serde_json::Value,
    ) -> Result<Job, JobError>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let snapshot = self.registry.insert(Job::new(kind, params, unix_now()))?;
        info!(job_id = %snapshot.id, kind = %kind, "job created");

        tokio::spawn(execute(self.registry.clone(), snapshot.id, executor));
        Ok(snapshot)
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.registry.get(id)
    }

    /// Snapshots newest-created first, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        self.registry.list(status)
    }

    pub fn stats(&self) -> JobStats {
        self.registry.stats()
    }

    /// Evict terminal jobs older than the retention window.
    pub fn cleanup(&self) -> usize {
        let retention = i64::try_from(self.config.retention.as_secs()).unwrap_or(i64::MAX);
        let removed = self.registry.remove_expired(retention, unix_now());
        if removed > 0 {
            info!(removed, remaining = self.registry.len(), "evicted expired jobs");
        }
        removed
    }

    /// Start the periodic cleanup sweep.
    pub fn spawn_cleanup_worker(&self) -> CleanupWorkerHandle {
        let shutdown = Arc::new(Notify::new());
        let manager = self.clone();
        let signal = shutdown.clone();

        let join = tokio::spawn(async move {
            info!(
                interval_secs = manager.config.cleanup_interval.as_secs_f64(),
                retention_secs = manager.config.retention.as_secs(),
                "job cleanup worker started"
            );

            let mut ticker = tokio::time::interval(manager.config.cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = signal.notified() => break,
                    _ = ticker.tick() => {
                        manager.cleanup();
                    }
                }
            }

            info!("job cleanup worker stopped");
        });

        CleanupWorkerHandle { shutdown, join }
    }
}

/// Handle to control a running cleanup worker.
#[derive(Debug)]
pub struct CleanupWorkerHandle {
    shutdown: Arc<Notify>,
    join: JoinHandle<()>,
}

impl CleanupWorkerHandle {
    /// Request graceful shutdown and wait for the worker to exit.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            warn!(error = %e, "job cleanup worker did not exit cleanly");
        }
    }
}

/// Supervise one job: run the executor in its own task so that errors and
/// panics both land in exactly one terminal write.
async fn execute<F, Fut>(registry: Arc<JobRegistry>, id: JobId, executor: F)
where
    F: FnOnce(JobContext) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    if let Err(e) = registry.mark_processing(id, unix_now()) {
        warn!(job_id = %id, error = %e, "job could not enter processing");
        return;
    }
    debug!(job_id = %id, "job processing");

    let ctx = JobContext {
        id,
        registry: registry.clone(),
    };
    let outcome = match tokio::spawn(async move { executor(ctx).await }).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(join_err) => Err(describe_join_error(join_err)),
    };

    let written = match outcome {
        Ok(value) => registry.complete(id, value, unix_now()),
        Err(message) => {
            warn!(job_id = %id, error = %message, "job failed");
            registry.fail(id, message, unix_now())
        }
    };

    match written {
        Ok(job) => info!(job_id = %id, status = %job.status, "job finished"),
        Err(e) => warn!(job_id = %id, error = %e, "terminal state was not recorded"),
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        return "executor task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => format!("executor panicked: {}", panic_message(payload.as_ref())),
        Err(err) => format!("executor task failed: {err}"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic payload"
    }
}
