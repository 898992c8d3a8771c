//! Core job types.

use serde::{Deserialize, Serialize};

use genjobs_core::JobId;

/// Progress reported when a job enters `processing`.
pub const START_PROGRESS: u8 = 10;

/// Highest progress an executor may report; 100 is reserved for completion.
pub const MAX_REPORTED_PROGRESS: u8 = 99;

/// Kind of generative work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ImageGeneration,
    ImageComposition,
    VideoGeneration,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ImageGeneration => "image_generation",
            JobKind::ImageComposition => "image_composition",
            JobKind::VideoGeneration => "video_generation",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, executor not started yet
    Pending,
    /// Executor running
    Processing,
    /// Executor returned a result
    Completed,
    /// Executor returned an error or panicked
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked unit of generative work.
///
/// Values handed out by the registry are snapshots; mutating one has no
/// effect on the job itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// 0-100, never decreases
    pub progress: u8,
    /// Seconds since epoch
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
    /// Present only when `status == Completed`
    pub result: Option<serde_json::Value>,
    /// Present only when `status == Failed`
    pub error: Option<String>,
    /// Request parameters, kept for traceability
    pub params: serde_json::Value,
}

impl Job {
    pub fn new(kind: JobKind, params: serde_json::Value, now: i64) -> Self {
        Self {
            id: JobId::new(),
            kind,
            status: JobStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result: None,
            error: None,
            params,
        }
    }

    pub(crate) fn mark_processing(&mut self, now: i64) {
        self.status = JobStatus::Processing;
        self.progress = self.progress.max(START_PROGRESS);
        self.updated_at = now;
    }

    pub(crate) fn mark_completed(&mut self, result: serde_json::Value, now: i64) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.error = None;
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    /// Progress is left where it was: a failed job reports how far it got.
    pub(crate) fn mark_failed(&mut self, error: String, now: i64) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.result = None;
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    /// Raise progress; returns whether anything changed.
    pub(crate) fn raise_progress(&mut self, progress: u8, now: i64) -> bool {
        let progress = progress.min(MAX_REPORTED_PROGRESS);
        if self.status != JobStatus::Processing || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        self.updated_at = now;
        true
    }
}
