//! Process-wide logging for the job runtime.

/// Subscriber configuration (filters, output format).
pub mod tracing;

pub use tracing::LogFormat;

/// Install logging with the `info` default filter and the format chosen by
/// `GENJOBS_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init("info", LogFormat::from_env());
}
