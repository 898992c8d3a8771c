//! In-process job lifecycle management.
//!
//! ## Design
//!
//! - Jobs are created with an injected async executor and run immediately in
//!   the background; `create` never blocks on the executor
//! - Status is a one-way state machine: `pending → processing → completed | failed`
//! - The registry is the only shared mutable state; every read is a snapshot
//! - Terminal jobs are evicted after a retention window by a periodic sweep
//!
//! ## Components
//!
//! - `Job`: snapshot of one tracked unit of generative work
//! - `JobRegistry`: lock-guarded map enforcing the state machine
//! - `JobManager`: spawns executors, exposes `get`/`list`/`stats`/`cleanup`
//! - `CleanupWorkerHandle`: controls the periodic eviction task

pub mod manager;
pub mod store;
pub mod types;

pub use manager::{CleanupWorkerHandle, JobContext, JobManager, JobManagerConfig};
pub use store::{JobError, JobRegistry, JobStats};
pub use types::{Job, JobKind, JobStatus};
