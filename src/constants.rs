//! # Constants.

use std::time::Duration;

use once_cell::sync::Lazy;

pub static GEOCLOCK_VERSION_STR: Lazy<String> =
    Lazy::new(|| env!("CARGO_PKG_VERSION").to_string());

/// Whether the auto-clock-out monitor runs at all.
pub const LOCATION_MONITOR_ENABLED: bool = true;

/// Whether auto-clock-out notifications are sent to employees and managers.
pub const NOTIFICATIONS_ENABLED: bool = true;

/// Cadence of the auto-clock-out monitor.
pub const CHECK_INTERVAL_MINUTES: i64 = 5;

/// Maximum age of a non-live location before it counts as stale.
pub const MAX_LOCATION_AGE_MINUTES: i64 = 10;

/// Delay before the first monitor tick after start-up, so that databases
/// and the chat transport have a chance to settle.
pub(crate) const MONITOR_WARMUP: Duration = Duration::from_secs(30);

/// Cadence of the live-session sweeper.
pub(crate) const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Tolerance for absent live updates before the sweeper finalizes a session.
pub(crate) const LIVE_GRACE_MS: i64 = 120_000;

/// Timezone used when an employee has none configured and `DEFAULT_TZ` is unset.
pub const DEFAULT_TIMEZONE: &str = "Africa/Nairobi";

/// Document-store writes are retried this many times after the first failure.
pub(crate) const STORE_RETRY_COUNT: u32 = 2;

/// Delay between document-store retries.
pub(crate) const STORE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Long-poll timeout passed to the chat transport's `getUpdates`.
pub(crate) const POLL_TIMEOUT_SECS: u64 = 50;

/// Back-off after a transport failure before polling again.
pub(crate) const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Expected working hours per day, used by the human classification path.
pub(crate) const EXPECTED_DAILY_HOURS: f64 = 8.0;

/// A day counts as present ("P") at or above this share of the expected hours.
pub(crate) const PRESENT_THRESHOLD: f64 = 0.75;

/// A day counts as half-present ("H") at or above this share of the expected hours.
pub(crate) const HALF_PRESENT_THRESHOLD: f64 = 0.5;
