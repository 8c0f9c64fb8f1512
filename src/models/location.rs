//! Coordinate model, cache keys and local time zones

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TideCastError;

/// A validated geographic coordinate
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting non-finite or out-of-range values
    pub fn new(lat: f64, lon: f64) -> Result<Self, TideCastError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(TideCastError::invalid_input(format!(
                "Latitude must be between -90 and 90 degrees, got: {lat}"
            )));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(TideCastError::invalid_input(format!(
                "Longitude must be between -180 and 180 degrees, got: {lon}"
            )));
        }
        Ok(Self { lat, lon })
    }

    /// Format location as coordinates string
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.lat, self.lon)
    }

    /// Round coordinates to `precision` decimal places
    #[must_use]
    pub fn rounded_coordinates(&self, precision: u32) -> (f64, f64) {
        let multiplier = 10_f64.powi(i32::try_from(precision).unwrap_or(3));
        let lat = (self.lat * multiplier).round() / multiplier;
        let lon = (self.lon * multiplier).round() / multiplier;
        (lat, lon)
    }

    /// Generate the cache identity for this coordinate
    #[must_use]
    pub fn cache_key(&self, precision: u32) -> CoordinateKey {
        CoordinateKey::new(self, precision)
    }

    /// Offset used to decide what "today" means at this coordinate.
    ///
    /// Approximated from longitude in whole hours (15° per hour), clamped
    /// to the range of civil offsets in use.
    #[must_use]
    pub fn local_offset(&self) -> FixedOffset {
        let hours = (self.lon / 15.0).round().clamp(-12.0, 14.0) as i32;
        FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Zone approximated from longitude
    #[must_use]
    pub fn local_zone(&self) -> LocalZone {
        LocalZone::Approximate(self.local_offset())
    }
}

/// Time zone used for the local day and forecast labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalZone {
    /// Whole-hour offset derived from longitude
    Approximate(FixedOffset),
    /// IANA zone supplied by the caller, DST aware
    Named(Tz),
}

impl LocalZone {
    /// Resolve an IANA zone name such as `Europe/Madrid`
    pub fn from_name(name: &str) -> Result<Self, TideCastError> {
        name.trim()
            .parse::<Tz>()
            .map(LocalZone::Named)
            .map_err(|_| TideCastError::invalid_input(format!("Unknown timezone: {name}")))
    }

    /// `time` on the local wall clock
    #[must_use]
    pub fn to_local(&self, time: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            LocalZone::Approximate(offset) => time.with_timezone(offset),
            LocalZone::Named(tz) => time.with_timezone(tz).fixed_offset(),
        }
    }

    #[must_use]
    pub fn local_date(&self, time: DateTime<Utc>) -> NaiveDate {
        self.to_local(time).date_naive()
    }

    /// Start of the local calendar day containing `now`
    #[must_use]
    pub fn local_midnight(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let Some(midnight) = self.local_date(now).and_hms_opt(0, 0, 0) else {
            return now;
        };
        let start = match self {
            LocalZone::Approximate(offset) => offset
                .from_local_datetime(&midnight)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
            LocalZone::Named(tz) => tz
                .from_local_datetime(&midnight)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
        };
        start.unwrap_or(now)
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalZone::Approximate(offset) => write!(f, "UTC{offset}"),
            LocalZone::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// Hashable cache key for a rounded coordinate and an optional explicit zone
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct CoordinateKey {
    lat_scaled: i64,
    lon_scaled: i64,
    precision: u32,
    timezone: Option<Tz>,
}

impl CoordinateKey {
    #[must_use]
    pub fn new(coordinate: &Coordinate, precision: u32) -> Self {
        let multiplier = 10_f64.powi(i32::try_from(precision).unwrap_or(3));
        Self {
            lat_scaled: (coordinate.lat * multiplier).round() as i64,
            lon_scaled: (coordinate.lon * multiplier).round() as i64,
            precision,
            timezone: None,
        }
    }

    /// Same location, local day taken from `zone` when it is a named zone
    #[must_use]
    pub fn with_zone(mut self, zone: Option<LocalZone>) -> Self {
        self.timezone = match zone {
            Some(LocalZone::Named(tz)) => Some(tz),
            _ => None,
        };
        self
    }

    /// Zone bundles for this key are built in
    #[must_use]
    pub fn zone(&self) -> LocalZone {
        self.timezone
            .map_or_else(|| self.coordinate().local_zone(), LocalZone::Named)
    }

    /// The rounded coordinate this key stands for
    #[must_use]
    pub fn coordinate(&self) -> Coordinate {
        let multiplier = 10_f64.powi(i32::try_from(self.precision).unwrap_or(3));
        Coordinate {
            lat: self.lat_scaled as f64 / multiplier,
            lon: self.lon_scaled as f64 / multiplier,
        }
    }
}

impl fmt::Display for CoordinateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.coordinate();
        let precision = self.precision as usize;
        write!(f, "{:.precision$},{:.precision$}", c.lat, c.lon)?;
        if let Some(tz) = self.timezone {
            write!(f, "@{}", tz.name())?;
        }
        Ok(())
    }
}
