//! The polling loop.

use std::future::Future;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::policy::PollPolicy;
use crate::types::{PollError, PollOutcome, PollReport, ProbeResult, ProbeStatus};

/// Fail code reported when the correlation id never became visible.
pub const RECORD_NOT_FOUND: &str = "record_not_found";

/// Verdict for a single probe result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Succeeded { fast_path_url: Option<String> },
    Failed { fail_code: String },
    /// Still processing; `not_found` when the record was not visible at all
    Waiting { not_found: bool },
}

/// Classify one probe result against the policy.
///
/// Provider verdicts win. The URL scan is only consulted for results that
/// would otherwise keep waiting.
pub fn classify(policy: &PollPolicy, probe: &ProbeResult) -> Classification {
    let not_found = match &probe.status {
        ProbeStatus::NotFound => true,
        ProbeStatus::Observed(descriptor) => {
            if let Some(code) = descriptor.explicit_fail_code() {
                return Classification::Failed {
                    fail_code: code.to_string(),
                };
            }
            if policy.status_codes.is_failure(descriptor.status_code) {
                return Classification::Failed {
                    fail_code: format!("status_{}", descriptor.status_code),
                };
            }
            if policy.status_codes.is_success(descriptor.status_code)
                && descriptor.item_count >= policy.expected_items
            {
                return Classification::Succeeded {
                    fast_path_url: None,
                };
            }
            false
        }
    };

    // Fallback: some payloads expose the finished media in an unrelated field
    // before the status code flips.
    if let Some(url) = policy.scan_result_url(&probe.raw) {
        return Classification::Succeeded {
            fast_path_url: Some(url),
        };
    }
    Classification::Waiting { not_found }
}

/// Probe until the job succeeds, fails, or the policy's bounds run out.
///
/// The cancellation token is handed to every probe and also raced against
/// each probe and each inter-probe sleep. Probe errors are not retried.
pub async fn poll<F, Fut, E>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<PollOutcome, PollError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<ProbeResult, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    policy.validate()?;

    let started = Instant::now();
    let mut attempts: u32 = 0;
    let mut consecutive_not_found: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled { attempts });
        }
        attempts += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
            result = probe(cancel.clone()) => result,
        };
        let result = result.map_err(|e| PollError::Probe {
            attempt: attempts,
            source: e.into(),
        })?;

        let classification = classify(policy, &result);
        debug!(
            correlation_id = %result.correlation_id,
            attempt = attempts,
            verdict = ?classification,
            "probe classified"
        );

        let report = |last: ProbeResult| PollReport {
            attempts,
            elapsed: started.elapsed(),
            last: Some(last),
        };

        match classification {
            Classification::Succeeded { fast_path_url } => {
                info!(
                    correlation_id = %result.correlation_id,
                    attempts,
                    fast_path = fast_path_url.is_some(),
                    "poll succeeded"
                );
                return Ok(PollOutcome::Succeeded {
                    report: report(result),
                    fast_path_url,
                });
            }
            Classification::Failed { fail_code } => {
                warn!(correlation_id = %result.correlation_id, attempts, %fail_code, "poll failed");
                return Ok(PollOutcome::Failed {
                    report: report(result),
                    fail_code,
                });
            }
            Classification::Waiting { not_found: true } => {
                consecutive_not_found += 1;
                if let Some(limit) = policy.max_consecutive_not_found {
                    if consecutive_not_found > limit {
                        warn!(
                            correlation_id = %result.correlation_id,
                            consecutive_not_found,
                            "record never became visible"
                        );
                        return Ok(PollOutcome::Failed {
                            report: report(result),
                            fail_code: RECORD_NOT_FOUND.to_string(),
                        });
                    }
                }
            }
            Classification::Waiting { not_found: false } => consecutive_not_found = 0,
        }

        let elapsed = started.elapsed();
        if attempts >= policy.max_attempts || elapsed >= policy.timeout {
            info!(
                correlation_id = %result.correlation_id,
                attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "poll timed out"
            );
            return Ok(PollOutcome::TimedOut {
                report: report(result),
            });
        }

        // Never sleep past the deadline; the final probe lands on it.
        let delay = policy
            .delay_after_attempt(attempts)
            .min(policy.timeout.saturating_sub(elapsed));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
