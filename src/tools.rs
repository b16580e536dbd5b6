//! Some tools and enhancements to the used libraries, there should be
//! no references to the application logic in this module.

use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Shim over `std::time::SystemTime` so tests can shift the clock forward.
///
/// Production code must obtain the current time through this struct (or
/// through [`time`]/[`time_millis`]) instead of `SystemTime::now()`.
#[derive(Debug)]
pub struct SystemTime;

static SYSTEM_TIME_SHIFT: RwLock<Duration> = RwLock::new(Duration::new(0, 0));

impl SystemTime {
    pub const UNIX_EPOCH: std::time::SystemTime = std::time::SystemTime::UNIX_EPOCH;

    pub fn now() -> std::time::SystemTime {
        std::time::SystemTime::now()
            + *SYSTEM_TIME_SHIFT
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulates a system clock forward adjustment by `duration`.
    #[cfg(test)]
    pub(crate) fn shift(duration: Duration) {
        *SYSTEM_TIME_SHIFT
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) += duration;
    }
}

/// Returns the current timestamp as unix seconds.
pub fn time() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Returns the current timestamp as unix milliseconds.
///
/// The live-session registry does all of its expiry arithmetic in
/// milliseconds, matching the `live_period * 1000` conversion on ingestion.
pub fn time_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Returns the current time as a UTC datetime, consistent with [`time`].
pub fn now_utc() -> DateTime<Utc> {
    DateTime::<Utc>::from(SystemTime::now())
}

/// Converts a `Duration` to a string like "1h 2m 3s".
pub(crate) fn duration_to_str(duration: Duration) -> String {
    let secs = duration.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = (secs % 3600) % 60;
    format!("{h}h {m}m {s}s")
}
