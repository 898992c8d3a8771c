//! Poll policy: interval, bounds and status classification.

use std::collections::BTreeSet;
use std::time::Duration;

use regex::Regex;

use genjobs_core::Settings;

use crate::types::PollError;

/// Media URLs the fast path recognises in raw history payloads.
pub const DEFAULT_RESULT_URL_PATTERN: &str = r#"https?://[^\s"'\\<>]+?\.(?:mp4|mov|webm|png|jpe?g|webp|gif|mp3|wav|m4a|aac)(?:\?[^\s"'\\<>]*)?"#;

/// How the delay between probes evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntervalStrategy {
    /// Same delay every time
    #[default]
    Fixed,
    /// base * attempt, capped
    Linear,
    /// base * 2^(attempt-1), capped
    Exponential,
}

/// Which provider status codes are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCodes {
    pub success: BTreeSet<i64>,
    pub failure: BTreeSet<i64>,
}

impl Default for StatusCodes {
    fn default() -> Self {
        Self {
            success: [10, 50].into_iter().collect(),
            failure: [30].into_iter().collect(),
        }
    }
}

impl StatusCodes {
    pub fn is_success(&self, code: i64) -> bool {
        self.success.contains(&code)
    }

    pub fn is_failure(&self, code: i64) -> bool {
        self.failure.contains(&code)
    }
}

/// Poll configuration.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Base delay between probes
    pub interval: Duration,
    /// Cap for growing strategies
    pub max_interval: Duration,
    pub strategy: IntervalStrategy,
    /// Maximum number of probes
    pub max_attempts: u32,
    /// Wall-clock bound, measured from the first probe
    pub timeout: Duration,
    /// Items that must be present before a success status counts
    pub expected_items: usize,
    /// Consecutive "not found" probes tolerated; `None` tolerates forever
    pub max_consecutive_not_found: Option<u32>,
    pub status_codes: StatusCodes,
    /// Fast-path scan of the raw payload; `None` disables it
    pub result_url: Option<Regex>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(2),
            strategy: IntervalStrategy::Fixed,
            max_attempts: 900,
            timeout: Duration::from_secs(30 * 60),
            expected_items: 1,
            max_consecutive_not_found: Some(30),
            status_codes: StatusCodes::default(),
            result_url: Regex::new(DEFAULT_RESULT_URL_PATTERN).ok(),
        }
    }
}

impl PollPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.poll_interval,
            max_interval: settings.poll_interval,
            max_attempts: settings.poll_max_attempts,
            timeout: settings.poll_timeout,
            max_consecutive_not_found: Some(settings.poll_max_not_found),
            ..Self::default()
        }
    }

    /// Fixed interval with the given bounds.
    pub fn fixed(interval: Duration, max_attempts: u32, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            strategy: IntervalStrategy::Fixed,
            max_attempts,
            timeout,
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: IntervalStrategy, max_interval: Duration) -> Self {
        self.strategy = strategy;
        self.max_interval = max_interval;
        self
    }

    pub fn with_expected_items(mut self, expected_items: usize) -> Self {
        self.expected_items = expected_items;
        self
    }

    pub fn with_max_consecutive_not_found(mut self, limit: Option<u32>) -> Self {
        self.max_consecutive_not_found = limit;
        self
    }

    pub fn with_status_codes(mut self, status_codes: StatusCodes) -> Self {
        self.status_codes = status_codes;
        self
    }

    pub fn with_result_url_pattern(mut self, pattern: &str) -> Result<Self, PollError> {
        let regex = Regex::new(pattern).map_err(|e| PollError::InvalidPolicy(e.to_string()))?;
        self.result_url = Some(regex);
        Ok(self)
    }

    pub fn without_result_url_scan(mut self) -> Self {
        self.result_url = None;
        self
    }

    pub fn validate(&self) -> Result<(), PollError> {
        if self.max_attempts == 0 {
            return Err(PollError::InvalidPolicy("max_attempts must be >= 1".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(PollError::InvalidPolicy("timeout must be > 0".to_string()));
        }
        if self.max_interval < self.interval {
            return Err(PollError::InvalidPolicy(
                "max_interval must be >= interval".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay to wait after the given (1-indexed) probe.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            IntervalStrategy::Fixed => self.interval,
            IntervalStrategy::Linear => self.interval.saturating_mul(attempt),
            IntervalStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.interval.saturating_mul(factor)
            }
        };

        match self.strategy {
            IntervalStrategy::Fixed => delay,
            _ => delay.min(self.max_interval),
        }
    }

    /// First media URL embedded in a raw payload, if scanning is enabled.
    pub fn scan_result_url(&self, raw: &str) -> Option<String> {
        self.result_url
            .as_ref()
            .and_then(|re| re.find(raw))
            .map(|m| m.as_str().to_string())
    }
}
