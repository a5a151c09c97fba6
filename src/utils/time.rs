use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Unix time in milliseconds, `0` if the clock is before the epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
