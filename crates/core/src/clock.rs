//! Wall-clock helpers.

use chrono::Utc;

/// Seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}
