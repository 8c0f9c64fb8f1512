//! Data models for the Tidecast service
//!
//! This module contains the core domain models organized by concern:
//! - Location: Coordinates, cache keys and local time zones
//! - Tide: Extrema, derived events and daily summaries
//! - Weather: Current conditions and forecast points
//! - Marine: Suitability scores, ratings and recommendations
//! - Bundle: The aggregate returned to clients

pub mod bundle;
pub mod location;
pub mod marine;
pub mod tide;
pub mod weather;

// Re-export all public types for convenient access
pub use bundle::{BundleLocation, BundleResponse, CacheStatus, TideWeatherBundle};
pub use location::{Coordinate, CoordinateKey, LocalZone};
pub use marine::{MarineConditions, OverallRating, Recommendation};
pub use tide::{DailyTideSummary, RawExtremum, TideEvent, TideState, TideTrend, TideType, UpcomingTide};
pub use weather::{ForecastPoint, ForecastSample, WeatherObservation, WeatherReport, WeatherSnapshot};
