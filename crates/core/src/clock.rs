use chrono::Utc;
use std::time::Duration;

/// Wall-clock time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Time left until `deadline_ms`, zero if it has passed.
pub fn until(deadline_ms: i64) -> Duration {
    let delta = deadline_ms.saturating_sub(now_ms());
    Duration::from_millis(u64::try_from(delta).unwrap_or(0))
}
