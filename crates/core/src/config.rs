//! Environment-driven settings.
//!
//! Every value has a default; unparsable values are logged and ignored so a
//! typo in the environment never prevents startup.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

pub const ENV_POLL_INTERVAL_MS: &str = "GENJOBS_POLL_INTERVAL_MS";
pub const ENV_POLL_MAX_ATTEMPTS: &str = "GENJOBS_POLL_MAX_ATTEMPTS";
pub const ENV_POLL_TIMEOUT_SECS: &str = "GENJOBS_POLL_TIMEOUT_SECS";
pub const ENV_POLL_MAX_NOT_FOUND: &str = "GENJOBS_POLL_MAX_NOT_FOUND";
pub const ENV_JOB_RETENTION_SECS: &str = "GENJOBS_JOB_RETENTION_SECS";
pub const ENV_CLEANUP_INTERVAL_SECS: &str = "GENJOBS_CLEANUP_INTERVAL_SECS";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "GENJOBS_HTTP_TIMEOUT_SECS";
pub const ENV_UPLOAD_REGION: &str = "GENJOBS_UPLOAD_REGION";

/// Process-wide tunables shared by the job manager, poller and uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base delay between two history probes.
    pub poll_interval: Duration,
    /// Upper bound on probes per poll.
    pub poll_max_attempts: u32,
    /// Wall-clock bound on a single poll, measured from the first probe.
    pub poll_timeout: Duration,
    /// Consecutive "not found" probes tolerated before giving up.
    pub poll_max_not_found: u32,
    /// How long terminal jobs are kept after their last update.
    pub job_retention: Duration,
    /// Period of the cleanup sweep.
    pub cleanup_interval: Duration,
    /// Transport timeout for every outbound HTTP call.
    pub http_timeout: Duration,
    /// Signing region for upload requests.
    pub upload_region: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(2_000),
            poll_max_attempts: 900,
            poll_timeout: Duration::from_secs(1_800),
            poll_max_not_found: 30,
            job_retention: Duration::from_secs(2 * 60 * 60),
            cleanup_interval: Duration::from_secs(300),
            http_timeout: Duration::from_secs(60),
            upload_region: "cn-north-1".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                ENV_POLL_INTERVAL_MS,
                defaults.poll_interval.as_millis() as u64,
            )),
            poll_max_attempts: parse_or(&lookup, ENV_POLL_MAX_ATTEMPTS, defaults.poll_max_attempts),
            poll_timeout: Duration::from_secs(parse_or(
                &lookup,
                ENV_POLL_TIMEOUT_SECS,
                defaults.poll_timeout.as_secs(),
            )),
            poll_max_not_found: parse_or(
                &lookup,
                ENV_POLL_MAX_NOT_FOUND,
                defaults.poll_max_not_found,
            ),
            job_retention: Duration::from_secs(parse_or(
                &lookup,
                ENV_JOB_RETENTION_SECS,
                defaults.job_retention.as_secs(),
            )),
            cleanup_interval: Duration::from_secs(parse_or(
                &lookup,
                ENV_CLEANUP_INTERVAL_SECS,
                defaults.cleanup_interval.as_secs(),
            )),
            http_timeout: Duration::from_secs(parse_or(
                &lookup,
                ENV_HTTP_TIMEOUT_SECS,
                defaults.http_timeout.as_secs(),
            )),
            upload_region: lookup(ENV_UPLOAD_REGION)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.upload_region),
        }
    }

    /// Reject values that would make the system spin or hang forever.
    pub fn validate(&self) -> CoreResult<()> {
        if self.poll_interval.is_zero() {
            return Err(CoreError::config(ENV_POLL_INTERVAL_MS, "must be > 0"));
        }
        if self.poll_max_attempts == 0 {
            return Err(CoreError::config(ENV_POLL_MAX_ATTEMPTS, "must be >= 1"));
        }
        if self.poll_timeout.is_zero() {
            return Err(CoreError::config(ENV_POLL_TIMEOUT_SECS, "must be > 0"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(CoreError::config(ENV_CLEANUP_INTERVAL_SECS, "must be > 0"));
        }
        if self.http_timeout.is_zero() {
            return Err(CoreError::config(ENV_HTTP_TIMEOUT_SECS, "must be > 0"));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + core::fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, default = %default, "ignoring unparsable setting");
                default
            }
        },
        None => default,
    }
}
