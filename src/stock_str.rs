//! # User-visible message strings.
//!
//! Collected in one place so wording stays consistent between the
//! validator's reasons, the notifier, and the command replies.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub(crate) fn no_location() -> String {
    "No location data has been received from your phone".to_string()
}

pub(crate) fn sharing_ended() -> String {
    "You stopped sharing your live location".to_string()
}

pub(crate) fn stale_location(age_minutes: i64, max_age_minutes: i64, last_seen: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "Your location was last updated {} minutes ago at {} (maximum allowed is {} minutes)",
        age_minutes,
        format_hour(last_seen, tz),
        max_age_minutes
    )
}

pub(crate) fn not_live() -> String {
    "You are not sharing your live location".to_string()
}

pub(crate) fn outside_area() -> String {
    "You are outside your designated working area".to_string()
}

pub(crate) fn bad_working_area() -> String {
    "Your working area could not be read; please contact your administrator".to_string()
}

pub(crate) fn auto_clock_out_employee(reason: &str) -> String {
    format!("⚠️ You have been automatically clocked out because {reason}.")
}

pub(crate) fn auto_clock_out_manager(employee_name: &str, reason: &str) -> String {
    format!("👤 Employee {employee_name} has been automatically clocked out due to {reason}.")
}

pub(crate) fn start_linked(name: &str) -> String {
    format!(
        "👋 Hello <b>{name}</b>! Your phone is linked. \
         Share your live location while clocked in to stay verified."
    )
}

pub(crate) fn start_unknown() -> String {
    "This phone is not linked to an employee record yet. \
     Please open the app and link your phone first."
        .to_string()
}

pub(crate) fn live_help() -> String {
    "To share your live location: tap 📎 → Location → Share My Live Location \
     and pick a period that covers your shift."
        .to_string()
}

pub(crate) fn app_button_text() -> String {
    "Open the attendance app:".to_string()
}

pub(crate) fn no_web_app() -> String {
    "No web app is configured for this server.".to_string()
}

pub(crate) fn unknown_command() -> String {
    "Unknown command. Try /start, /test, /app, /location or /live.".to_string()
}

pub(crate) fn no_location_stored() -> String {
    "No location is stored for you yet. Share your location to get started.".to_string()
}

pub(crate) fn location_status(
    latitude: f64,
    longitude: f64,
    age_minutes: i64,
    is_live: bool,
) -> String {
    format!(
        "📍 Last known position: {latitude:.5}, {longitude:.5}\n\
         Updated {age_minutes} minutes ago, live sharing {}",
        if is_live { "on" } else { "off" }
    )
}

/// Formats an hour the way attendance documents show it, e.g. "9:05 AM".
pub(crate) fn format_hour(timestamp: DateTime<Utc>, tz: Tz) -> String {
    timestamp.with_timezone(&tz).format("%-I:%M %p").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_hour_localizes() {
        let ts = Utc.with_ymd_and_hms(2024, 9, 2, 6, 5, 0).unwrap();
        // Nairobi is UTC+3 year-round.
        assert_eq!(format_hour(ts, chrono_tz::Africa::Nairobi), "9:05 AM");
        assert_eq!(format_hour(ts, chrono_tz::UTC), "6:05 AM");
    }

    #[test]
    fn test_notification_shapes() {
        let employee = auto_clock_out_employee("You are outside your designated working area");
        assert!(employee.starts_with("⚠️ You have been automatically clocked out because"));

        let manager = auto_clock_out_manager("Jane Wanjiku", "You stopped sharing your live location");
        assert!(manager.contains("Jane Wanjiku"));
        assert!(manager.starts_with("👤 Employee"));
    }
}
