//! Adaptive status polling for long-running provider jobs.
//!
//! A caller-supplied probe is invoked repeatedly until the remote job
//! succeeds, fails, or the attempt/time bounds run out. "Not found yet" is
//! treated as still processing (the backend's own write may not be visible
//! on the first probes), up to a configurable number of consecutive misses.
//!
//! - `types`: probe results, outcomes and errors
//! - `policy`: interval, bounds and status-code classification
//! - `poller`: the polling loop
//! - `history`: parser for the provider's history-by-ids payload

pub mod history;
pub mod policy;
pub mod poller;
pub mod types;

pub use history::{HistoryError, parse_history_response};
pub use policy::{IntervalStrategy, PollPolicy, StatusCodes};
pub use poller::{Classification, RECORD_NOT_FOUND, classify, poll};
pub use types::{
    PollError, PollOutcome, PollReport, ProbeResult, ProbeStatus, StatusDescriptor,
};
pub use tokio_util::sync::CancellationToken;
