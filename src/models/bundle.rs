//! The aggregate returned for a coordinate and its response envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DailyTideSummary, MarineConditions, Recommendation, UpcomingTide, WeatherReport};
use crate::error::Service;
use crate::marine::tide_analysis::relative_time;

/// Echo of the queried location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleLocation {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Everything known about a coordinate, built once per cache miss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TideWeatherBundle {
    pub location: BundleLocation,
    pub next_tides: Vec<UpcomingTide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_summary: Option<DailyTideSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marine_conditions: Option<MarineConditions>,
    pub recommendations: Recommendation,
    /// Upstreams that failed while building this bundle
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<Service>,
    pub generated_at: DateTime<Utc>,
}

impl TideWeatherBundle {
    /// True when an upstream section is missing
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.unavailable.is_empty()
    }

    /// Tide events still ahead of `now`, with relative times recomputed
    #[must_use]
    pub fn upcoming_at(&self, now: DateTime<Utc>) -> Vec<UpcomingTide> {
        self.next_tides
            .iter()
            .filter(|t| t.event.time >= now)
            .map(|t| UpcomingTide {
                event: t.event,
                relative_time: relative_time(t.event.time, now),
            })
            .collect()
    }
}

/// How a bundle was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Served from a fresh cache entry
    Hit,
    /// Built from upstream for this request
    Miss,
    /// Expired entry served because the rebuild failed
    Stale,
    /// Built from upstream with one source missing
    Partial,
}

impl CacheStatus {
    #[must_use]
    pub fn is_degraded(self) -> bool {
        matches!(self, CacheStatus::Stale | CacheStatus::Partial)
    }
}

/// Response envelope for the query endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BundleResponse {
    pub location: BundleLocation,
    pub next_tides: Vec<UpcomingTide>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_summary: Option<DailyTideSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather: Option<WeatherReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marine_conditions: Option<MarineConditions>,
    pub recommendations: Recommendation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<Service>,
    pub last_updated: DateTime<Utc>,
    pub degraded: bool,
    pub cache: CacheStatus,
}

impl BundleResponse {
    /// View of `bundle` as of `now`; tides that have since passed are dropped
    #[must_use]
    pub fn new(bundle: &TideWeatherBundle, status: CacheStatus, now: DateTime<Utc>) -> Self {
        Self {
            location: bundle.location.clone(),
            next_tides: bundle.upcoming_at(now),
            daily_summary: bundle.daily_summary,
            weather: bundle.weather.clone(),
            marine_conditions: bundle.marine_conditions.clone(),
            recommendations: bundle.recommendations.clone(),
            unavailable: bundle.unavailable.clone(),
            last_updated: bundle.generated_at,
            degraded: status.is_degraded() || bundle.is_partial(),
            cache: status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TideEvent, TideType};
    use chrono::Duration;

    fn bundle(now: DateTime<Utc>) -> TideWeatherBundle {
        let tide = |hours: i64, kind, height| UpcomingTide {
            event: TideEvent {
                time: now + Duration::hours(hours),
                kind,
                height,
            },
            relative_time: String::new(),
        };
        TideWeatherBundle {
            location: BundleLocation {
                lat: 40.713,
                lon: -74.006,
                name: None,
            },
            next_tides: vec![tide(1, TideType::High, 1.8), tide(7, TideType::Low, 0.2)],
            daily_summary: None,
            weather: None,
            marine_conditions: None,
            recommendations: Recommendation {
                best_activity: "beach walking".to_string(),
                best_time: None,
                tips: vec![],
            },
            unavailable: vec![Service::WeatherApi],
            generated_at: now,
        }
    }

    #[test]
    fn test_response_drops_passed_tides() {
        let now = Utc::now();
        let later = now + Duration::hours(2);
        let response = BundleResponse::new(&bundle(now), CacheStatus::Hit, later);
        assert_eq!(response.next_tides.len(), 1);
        assert_eq!(response.next_tides[0].event.kind, TideType::Low);
        assert_eq!(response.next_tides[0].relative_time, "5h 0m");
    }

    #[test]
    fn test_degraded_flag_and_absent_sections() {
        let now = Utc::now();
        let response = BundleResponse::new(&bundle(now), CacheStatus::Partial, now);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["degraded"], true);
        assert_eq!(json["cache"], "partial");
        assert_eq!(json["unavailable"][0], "weather_api");
        assert!(json.get("weather").is_none());
        assert!(json["location"].get("name").is_none());
        assert_eq!(json["next_tides"][0]["type"], "High");
    }

    #[test]
    fn test_cached_partial_bundle_stays_degraded() {
        let now = Utc::now();
        let response = BundleResponse::new(&bundle(now), CacheStatus::Hit, now);
        assert!(response.degraded);
        assert_eq!(response.cache, CacheStatus::Hit);
    }
}
