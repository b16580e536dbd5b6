//! # Location validation.
//!
//! A pure mapping from (current location, working area, policy) to a
//! verdict. The monitor decides what to do with the verdict; nothing here
//! touches the store.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::employee::CurrentLocation;
use crate::polygon::MultiPolygon;
use crate::stock_str;

/// Why a location failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictErrorKind {
    /// No location stored at all. Observed but never actioned.
    NoLocation,
    /// The live session was finalized.
    SharingEnded,
    /// Non-live location older than the configured maximum age.
    StaleLocation,
    /// Location exists but is not part of an active live session.
    NotLive,
    /// Live location outside every working-area polygon.
    OutsideArea,
    /// The working-area payload did not parse. Operator must fix it;
    /// never actioned.
    BadWorkingArea,
}

impl VerdictErrorKind {
    /// Whether this failure triggers an automatic clock-out.
    pub fn is_actionable(self) -> bool {
        matches!(
            self,
            Self::OutsideArea | Self::NotLive | Self::SharingEnded | Self::StaleLocation
        )
    }
}

/// Outcome of validating one employee's location.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_valid: bool,
    pub error_kind: Option<VerdictErrorKind>,
    pub error_message: Option<String>,
    pub accuracy: Option<f64>,
    /// `(latitude, longitude)` of the examined location, when one existed.
    pub coordinates: Option<(f64, f64)>,
    pub location_age_minutes: Option<i64>,
    /// Effective liveness: the stored flag, degraded when `live_until` passed.
    pub is_live: bool,
}

impl Verdict {
    fn invalid(kind: VerdictErrorKind, message: String) -> Self {
        Self {
            is_valid: false,
            error_kind: Some(kind),
            error_message: Some(message),
            accuracy: None,
            coordinates: None,
            location_age_minutes: None,
            is_live: false,
        }
    }

    fn with_location(mut self, location: &CurrentLocation, age_minutes: i64, is_live: bool) -> Self {
        self.accuracy = location.accuracy;
        self.coordinates = Some((location.latitude, location.longitude));
        self.location_age_minutes = Some(age_minutes);
        self.is_live = is_live;
        self
    }
}

/// Validates a stored location against the working area and freshness policy.
///
/// Total: exactly one verdict for any input, `is_valid` iff `error_kind` is
/// `None`. Decision order matters; the first failing rule wins.
pub fn validate(
    location: Option<&CurrentLocation>,
    working_area: &str,
    max_age_minutes: i64,
    tz: Tz,
    now: DateTime<Utc>,
) -> Verdict {
    let Some(location) = location else {
        return Verdict::invalid(VerdictErrorKind::NoLocation, stock_str::no_location());
    };

    if location.ended_at.is_some() {
        return Verdict::invalid(VerdictErrorKind::SharingEnded, stock_str::sharing_ended())
            .with_location(location, (now - location.updated_at).num_minutes(), false);
    }

    let age_minutes = (now - location.updated_at).num_minutes();
    let is_live = location.is_live
        && location
            .live_until
            .map_or(true, |live_until| now < live_until);

    if is_live {
        let area = match MultiPolygon::parse(working_area) {
            Ok(area) => area,
            Err(_) => {
                return Verdict::invalid(
                    VerdictErrorKind::BadWorkingArea,
                    stock_str::bad_working_area(),
                )
                .with_location(location, age_minutes, true);
            }
        };

        if !area.contains(location.longitude, location.latitude) {
            return Verdict::invalid(VerdictErrorKind::OutsideArea, stock_str::outside_area())
                .with_location(location, age_minutes, true);
        }

        Verdict {
            is_valid: true,
            error_kind: None,
            error_message: None,
            accuracy: location.accuracy,
            coordinates: Some((location.latitude, location.longitude)),
            location_age_minutes: Some(age_minutes),
            is_live: true,
        }
    } else if age_minutes > max_age_minutes {
        Verdict::invalid(
            VerdictErrorKind::StaleLocation,
            stock_str::stale_location(age_minutes, max_age_minutes, location.updated_at, tz),
        )
        .with_location(location, age_minutes, false)
    } else {
        Verdict::invalid(VerdictErrorKind::NotLive, stock_str::not_live())
            .with_location(location, age_minutes, false)
    }
}
