//! Probe results, poll outcomes and errors.

use std::time::Duration;

use serde::Serialize;

/// Status fields extracted from one visible history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDescriptor {
    /// Provider status code (e.g. 20 = processing, 50 = done, 30 = failed)
    pub status_code: i64,
    /// Provider failure code; `None` or `"0"` means no failure
    pub fail_code: Option<String>,
    /// Result items returned so far
    pub item_count: usize,
    /// Provider-reported finish time, seconds since epoch
    pub finish_time: Option<i64>,
}

impl StatusDescriptor {
    pub fn new(status_code: i64) -> Self {
        Self {
            status_code,
            fail_code: None,
            item_count: 0,
            finish_time: None,
        }
    }

    pub fn with_fail_code(mut self, fail_code: impl Into<String>) -> Self {
        self.fail_code = Some(fail_code.into());
        self
    }

    pub fn with_item_count(mut self, item_count: usize) -> Self {
        self.item_count = item_count;
        self
    }

    pub fn with_finish_time(mut self, finish_time: i64) -> Self {
        self.finish_time = Some(finish_time);
        self
    }

    /// The explicit failure code, if the provider set a meaningful one.
    pub fn explicit_fail_code(&self) -> Option<&str> {
        self.fail_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty() && *code != "0")
    }
}

/// What one probe saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeStatus {
    /// The correlation id is not visible to the backend yet
    NotFound,
    Observed(StatusDescriptor),
}

/// Result of one probe: the classified status plus the raw provider payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub correlation_id: String,
    pub status: ProbeStatus,
    pub raw: String,
}

impl ProbeResult {
    pub fn not_found(correlation_id: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ProbeStatus::NotFound,
            raw: raw.into(),
        }
    }

    pub fn observed(
        correlation_id: impl Into<String>,
        descriptor: StatusDescriptor,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            status: ProbeStatus::Observed(descriptor),
            raw: raw.into(),
        }
    }

    pub fn descriptor(&self) -> Option<&StatusDescriptor> {
        match &self.status {
            ProbeStatus::Observed(d) => Some(d),
            ProbeStatus::NotFound => None,
        }
    }
}

/// Bookkeeping shared by every outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub attempts: u32,
    pub elapsed: Duration,
    /// Most recent probe result
    pub last: Option<ProbeResult>,
}

/// Terminal result of a poll.
///
/// `Failed` and `TimedOut` mean different things to an end user ("generation
/// failed" vs "still running, check back later") and are kept apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded {
        report: PollReport,
        /// Set when the URL scan found the media before the status caught up
        fast_path_url: Option<String>,
    },
    Failed {
        report: PollReport,
        fail_code: String,
    },
    TimedOut {
        report: PollReport,
    },
}

impl PollOutcome {
    pub fn report(&self) -> &PollReport {
        match self {
            PollOutcome::Succeeded { report, .. }
            | PollOutcome::Failed { report, .. }
            | PollOutcome::TimedOut { report } => report,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded { .. })
    }
}

/// Poll errors: things that stop polling without a provider verdict.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The probe itself failed (transport or parse); propagated immediately.
    #[error("probe failed on attempt {attempt}: {source}")]
    Probe {
        attempt: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("poll cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
    #[error("invalid poll policy: {0}")]
    InvalidPolicy(String),
}
