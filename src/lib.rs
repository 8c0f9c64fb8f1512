//! `Tidecast` - tide, weather and marine-activity conditions for a coordinate
//!
//! This library aggregates tide extrema and weather observations from two
//! third-party feeds, derives tide events and activity suitability, and
//! serves the result over HTTP with a short-lived per-coordinate cache.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod marine;
pub mod marine_forecast;
pub mod models;
pub mod upstream;
pub mod web;

// Re-export core types for public API
pub use cache::{AggregationCache, BuildOutcome};
pub use config::TideCastConfig;
pub use error::{ErrorKind, Service, TideCastError};
pub use health::{HealthReport, HealthStatus};
pub use marine_forecast::MarineForecastService;
pub use models::{BundleResponse, CacheStatus, Coordinate, TideEvent, TideType, TideWeatherBundle};
pub use upstream::{OpenWeatherClient, TideProvider, TideWindow, WeatherProvider, WorldTidesClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, TideCastError>;
