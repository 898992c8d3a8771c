//! Lock-guarded job registry.
//!
//! All mutation goes through methods that check the current status under the
//! write lock, so a cleanup sweep and an in-flight status update can never
//! race into a lost update.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use genjobs_core::JobId;

use super::types::{Job, JobStatus};

/// Registry error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job {id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Job counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// In-memory job registry. Lost on process restart.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every write leaves the map consistent, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new job and return its snapshot.
    pub fn insert(&self, job: Job) -> Result<Job, JobError> {
        let mut jobs = self.write();
        if jobs.contains_key(&job.id) {
            return Err(JobError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.read().get(&id).cloned()
    }

    /// Snapshots of all jobs, newest first, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        let jobs = self.read();
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();

        // created_at has second resolution; the v7 id breaks ties in creation order.
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        result
    }

    pub fn stats(&self) -> JobStats {
        let jobs = self.read();
        let mut stats = JobStats {
            total: jobs.len(),
            ..JobStats::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `pending → processing`.
    pub fn mark_processing(&self, id: JobId, now: i64) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Processing, |job| job.mark_processing(now))
    }

    /// `processing → completed`.
    pub fn complete(&self, id: JobId, result: serde_json::Value, now: i64) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Completed, |job| job.mark_completed(result, now))
    }

    /// `processing → failed`.
    pub fn fail(&self, id: JobId, error: String, now: i64) -> Result<Job, JobError> {
        self.transition(id, JobStatus::Failed, |job| job.mark_failed(error, now))
    }

    /// Raise a processing job's progress. Lower values and reports for jobs
    /// in any other state are ignored.
    pub fn report_progress(&self, id: JobId, progress: u8, now: i64) -> bool {
        let mut jobs = self.write();
        jobs.get_mut(&id)
            .map_or(false, |job| job.raise_progress(progress, now))
    }

    /// Remove terminal jobs whose last update is older than `retention_secs`.
    pub fn remove_expired(&self, retention_secs: i64, now: i64) -> usize {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| !job.status.is_terminal() || now - job.updated_at <= retention_secs);
        before - jobs.len()
    }

    fn transition<F>(&self, id: JobId, to: JobStatus, apply: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(JobError::NotFound(id))?;
        if !job.status.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }
        apply(job);
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobKind;
    use serde_json::json;

    fn job_at(created_at: i64) -> Job {
        Job::new(JobKind::ImageGeneration, json!({}), created_at)
    }

    #[test]
    fn snapshots_are_detached() {
        let registry = JobRegistry::new();
        let job = registry.insert(job_at(0)).unwrap();

        let mut snapshot = registry.get(job.id).unwrap();
        snapshot.status = JobStatus::Completed;
        snapshot.progress = 100;

        let fresh = registry.get(job.id).unwrap();
        assert_eq!(fresh.status, JobStatus::Pending);
        assert_eq!(fresh.progress, 0);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let registry = JobRegistry::new();
        let job = job_at(0);
        registry.insert(job.clone()).unwrap();
        assert_eq!(registry.insert(job.clone()), Err(JobError::AlreadyExists(job.id)));
    }

    #[test]
    fn terminal_write_happens_once() {
        let registry = JobRegistry::new();
        let job = registry.insert(job_at(0)).unwrap();

        registry.mark_processing(job.id, 1).unwrap();
        registry.complete(job.id, json!({"url": "x"}), 2).unwrap();

        let err = registry.fail(job.id, "late".to_string(), 3).unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition { from: JobStatus::Completed, to: JobStatus::Failed, .. }
        ));
        let err = registry.mark_processing(job.id, 4).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));

        let stored = registry.get(job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.error.is_none());
    }

    #[test]
    fn cannot_complete_a_pending_job() {
        let registry = JobRegistry::new();
        let job = registry.insert(job_at(0)).unwrap();
        assert!(registry.complete(job.id, json!(null), 1).is_err());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = JobRegistry::new();
        let id = JobId::new();
        assert!(registry.get(id).is_none());
        assert_eq!(registry.mark_processing(id, 0), Err(JobError::NotFound(id)));
        assert!(!registry.report_progress(id, 50, 0));
    }

    #[test]
    fn list_is_newest_first_and_filters() {
        let registry = JobRegistry::new();
        let a = registry.insert(job_at(10)).unwrap();
        let b = registry.insert(job_at(20)).unwrap();
        let c = registry.insert(job_at(20)).unwrap();
        registry.mark_processing(a.id, 30).unwrap();

        let all: Vec<JobId> = registry.list(None).into_iter().map(|j| j.id).collect();
        assert_eq!(all, vec![c.id, b.id, a.id]);

        let processing = registry.list(Some(JobStatus::Processing));
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, a.id);
    }

    #[test]
    fn stats_count_every_status() {
        let registry = JobRegistry::new();
        let a = registry.insert(job_at(0)).unwrap();
        let b = registry.insert(job_at(0)).unwrap();
        let c = registry.insert(job_at(0)).unwrap();
        registry.insert(job_at(0)).unwrap();

        registry.mark_processing(a.id, 1).unwrap();
        registry.mark_processing(b.id, 1).unwrap();
        registry.mark_processing(c.id, 1).unwrap();
        registry.complete(b.id, json!(1), 2).unwrap();
        registry.fail(c.id, "x".to_string(), 2).unwrap();

        assert_eq!(
            registry.stats(),
            JobStats { pending: 1, processing: 1, completed: 1, failed: 1, total: 4 }
        );
    }

    #[test]
    fn expiry_only_touches_old_terminal_jobs() {
        let registry = JobRegistry::new();
        let old_pending = registry.insert(job_at(0)).unwrap();
        let old_processing = registry.insert(job_at(0)).unwrap();
        let old_done = registry.insert(job_at(0)).unwrap();
        let fresh_failed = registry.insert(job_at(0)).unwrap();

        registry.mark_processing(old_processing.id, 0).unwrap();
        registry.mark_processing(old_done.id, 0).unwrap();
        registry.complete(old_done.id, json!({}), 10).unwrap();
        registry.mark_processing(fresh_failed.id, 0).unwrap();
        registry.fail(fresh_failed.id, "x".to_string(), 9_000).unwrap();

        let removed = registry.remove_expired(7_200, 10_000);
        assert_eq!(removed, 1);
        assert!(registry.get(old_done.id).is_none());
        assert!(registry.get(old_pending.id).is_some());
        assert!(registry.get(old_processing.id).is_some());
        assert!(registry.get(fresh_failed.id).is_some());
    }
}
