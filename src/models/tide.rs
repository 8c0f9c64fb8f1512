//! Tide extrema, derived events and daily summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a tide extremum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TideType {
    High,
    Low,
}

impl fmt::Display for TideType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TideType::High => write!(f, "High"),
            TideType::Low => write!(f, "Low"),
        }
    }
}

/// Extremum as handed over by the tide provider, classification optional
#[derive(Debug, Clone, PartialEq)]
pub struct RawExtremum {
    pub time: DateTime<Utc>,
    /// Height in meters relative to the provider's datum
    pub height: f64,
    pub kind: Option<TideType>,
}

/// A classified high or low water
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TideEvent {
    pub time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: TideType,
    /// Height in meters
    pub height: f64,
}

/// A tide event as presented to clients, annotated with time remaining
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingTide {
    #[serde(flatten)]
    pub event: TideEvent,
    pub relative_time: String,
}

/// High/low counts and height range for the local calendar day
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyTideSummary {
    pub high_tides_count: u32,
    pub low_tides_count: u32,
    pub max_height: f64,
    pub min_height: f64,
}

/// Direction the water is moving in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TideTrend {
    Rising,
    Falling,
}

/// Where the tide stands at query time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TideState {
    /// Last extremum before now
    pub previous: Option<TideEvent>,
    /// First extremum at or after now
    pub next: Option<TideEvent>,
    /// Extremum after `next`
    pub following: Option<TideEvent>,
    /// Interpolated height between `previous` and `next`
    pub current_height: Option<f64>,
    pub trend: Option<TideTrend>,
}

impl TideState {
    /// Position of the water between the surrounding low and high, 0.0 = low water
    #[must_use]
    pub fn fill_fraction(&self) -> Option<f64> {
        let (previous, next, current) = (self.previous?, self.next?, self.current_height?);
        let (low, high) = if previous.height <= next.height {
            (previous.height, next.height)
        } else {
            (next.height, previous.height)
        };
        let range = high - low;
        if range <= f64::EPSILON {
            return None;
        }
        Some(((current - low) / range).clamp(0.0, 1.0))
    }

    /// Height most representative of now: the estimate, else the next extremum
    #[must_use]
    pub fn reference_height(&self) -> Option<f64> {
        self.current_height.or(self.next.map(|e| e.height))
    }
}
