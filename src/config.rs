//! Configuration management for `Tidecast`
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::TideCastError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no tide API key is configured
pub const TIDES_KEY_ENV: &str = "WORLD_TIDES_API_KEY";
/// Environment variable consulted when no weather API key is configured
pub const WEATHER_KEY_ENV: &str = "OPENWEATHER_API_KEY";

/// Root configuration structure for the `Tidecast` service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TideCastConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Tide provider (WorldTides) settings
    #[serde(default)]
    pub tides: TidesConfig,
    /// Weather provider (OpenWeatherMap) settings
    #[serde(default)]
    pub weather: WeatherConfig,
    /// Aggregation cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Warning thresholds and activity profiles
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on the handling time of a single request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u32,
}

/// Tide provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TidesConfig {
    /// WorldTides API key
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_tides_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_seconds: u32,
    /// Retries after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Length of the extrema window, starting at local midnight
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    /// Upcoming tide events returned to clients
    #[serde(default = "default_display_count")]
    pub display_count: usize,
}

/// Weather provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// OpenWeatherMap API key
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_seconds: u32,
    /// Retries after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Forecast slots kept for the bundle
    #[serde(default = "default_forecast_points")]
    pub forecast_points: usize,
}

/// Aggregation cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window of a bundle in minutes
    #[serde(default = "default_cache_ttl")]
    pub ttl_minutes: u32,
    /// Decimal places kept when keying a coordinate
    #[serde(default = "default_key_precision")]
    pub key_precision: u32,
    /// How long expired bundles are kept as a stale fallback
    #[serde(default = "default_stale_grace")]
    pub stale_grace_minutes: u32,
}

/// Which part of the tide cycle an activity prefers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TidePreference {
    High,
    Low,
    Mid,
    Any,
}

/// Scoring rules for one activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityProfile {
    /// Key used in the suitability map
    pub name: String,
    /// Score before any adjustment
    pub base: f64,
    /// Wind band (m/s) that earns `ideal_wind_bonus`
    #[serde(default)]
    pub ideal_wind_min: f64,
    pub ideal_wind_max: f64,
    #[serde(default)]
    pub ideal_wind_bonus: f64,
    /// Wind above this (m/s) costs `wind_penalty_per_ms` per m/s
    pub wind_limit: f64,
    #[serde(default)]
    pub wind_penalty_per_ms: f64,
    #[serde(default)]
    pub min_visibility_km: Option<f64>,
    #[serde(default)]
    pub visibility_penalty: f64,
    #[serde(default = "default_tide_preference")]
    pub tide_preference: TidePreference,
    /// Maximum swing (either direction) from the tide position
    #[serde(default)]
    pub tide_weight: f64,
    /// Applied when the condition mentions rain, snow or storms
    #[serde(default)]
    pub precipitation_penalty: f64,
    #[serde(default)]
    pub min_temperature: Option<f64>,
    #[serde(default)]
    pub cold_penalty: f64,
}

/// Warning thresholds and activity profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Wind speed (m/s) above which a warning is raised
    #[serde(default = "default_high_wind")]
    pub high_wind_threshold: f64,
    /// Visibility (km) below which a warning is raised
    #[serde(default = "default_low_visibility")]
    pub low_visibility_km: f64,
    #[serde(default = "default_safe_tide_min")]
    pub safe_tide_min: f64,
    #[serde(default = "default_safe_tide_max")]
    pub safe_tide_max: f64,
    /// Air temperature (°C) below which a warning is raised
    #[serde(default = "default_cold_temperature")]
    pub cold_temperature: f64,
    #[serde(default = "default_activities")]
    pub activities: Vec<ActivityProfile>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout() -> u32 {
    30
}

fn default_tides_base_url() -> String {
    "https://www.worldtides.info/api/v3".to_string()
}

fn default_weather_base_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_upstream_timeout() -> u32 {
    8
}

fn default_max_retries() -> u32 {
    1
}

fn default_window_hours() -> u32 {
    48
}

fn default_display_count() -> usize {
    4
}

fn default_forecast_points() -> usize {
    4
}

fn default_cache_ttl() -> u32 {
    30
}

fn default_key_precision() -> u32 {
    3
}

fn default_stale_grace() -> u32 {
    360
}

fn default_tide_preference() -> TidePreference {
    TidePreference::Any
}

fn default_high_wind() -> f64 {
    10.0
}

fn default_low_visibility() -> f64 {
    2.0
}

fn default_safe_tide_min() -> f64 {
    -1.0
}

fn default_safe_tide_max() -> f64 {
    3.0
}

fn default_cold_temperature() -> f64 {
    10.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_activities() -> Vec<ActivityProfile> {
    vec![
        ActivityProfile {
            name: "swimming".to_string(),
            base: 6.0,
            ideal_wind_min: 0.0,
            ideal_wind_max: 5.0,
            ideal_wind_bonus: 1.0,
            wind_limit: 12.0,
            wind_penalty_per_ms: 0.4,
            min_visibility_km: None,
            visibility_penalty: 0.0,
            tide_preference: TidePreference::High,
            tide_weight: 1.0,
            precipitation_penalty: 1.5,
            min_temperature: Some(18.0),
            cold_penalty: 3.0,
        },
        ActivityProfile {
            name: "surfing".to_string(),
            base: 5.0,
            ideal_wind_min: 5.0,
            ideal_wind_max: 15.0,
            ideal_wind_bonus: 2.0,
            wind_limit: 20.0,
            wind_penalty_per_ms: 0.3,
            min_visibility_km: Some(1.0),
            visibility_penalty: 1.0,
            tide_preference: TidePreference::High,
            tide_weight: 2.0,
            precipitation_penalty: 0.5,
            min_temperature: None,
            cold_penalty: 0.0,
        },
        ActivityProfile {
            name: "fishing".to_string(),
            base: 6.0,
            ideal_wind_min: 0.0,
            ideal_wind_max: 10.0,
            ideal_wind_bonus: 2.0,
            wind_limit: 15.0,
            wind_penalty_per_ms: 0.4,
            min_visibility_km: None,
            visibility_penalty: 0.0,
            tide_preference: TidePreference::Low,
            tide_weight: 2.0,
            precipitation_penalty: 1.0,
            min_temperature: None,
            cold_penalty: 0.0,
        },
        ActivityProfile {
            name: "boating".to_string(),
            base: 7.0,
            ideal_wind_min: 0.0,
            ideal_wind_max: 8.0,
            ideal_wind_bonus: 1.0,
            wind_limit: 10.0,
            wind_penalty_per_ms: 0.5,
            min_visibility_km: Some(5.0),
            visibility_penalty: 3.0,
            tide_preference: TidePreference::Any,
            tide_weight: 0.0,
            precipitation_penalty: 1.5,
            min_temperature: None,
            cold_penalty: 0.0,
        },
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for TidesConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_tides_base_url(),
            timeout_seconds: default_upstream_timeout(),
            max_retries: default_max_retries(),
            window_hours: default_window_hours(),
            display_count: default_display_count(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_weather_base_url(),
            timeout_seconds: default_upstream_timeout(),
            max_retries: default_max_retries(),
            forecast_points: default_forecast_points(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_cache_ttl(),
            key_precision: default_key_precision(),
            stale_grace_minutes: default_stale_grace(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            high_wind_threshold: default_high_wind(),
            low_visibility_km: default_low_visibility(),
            safe_tide_min: default_safe_tide_min(),
            safe_tide_max: default_safe_tide_max(),
            cold_temperature: default_cold_temperature(),
            activities: default_activities(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl TideCastConfig {
    /// Load configuration from `tidecast.toml` and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // TIDECAST__CACHE__TTL_MINUTES=10 style overrides
        builder = builder.add_source(
            Environment::with_prefix("TIDECAST")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| format!("Failed to build configuration from {}", config_file.display()))?;

        let mut config: TideCastConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_credentials_from_env();
        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Default configuration file, relative to the working directory
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        Path::new("tidecast.toml").to_path_buf()
    }

    /// Fill missing API keys from the provider-specific environment variables
    pub fn apply_credentials_from_env(&mut self) {
        if self.tides.api_key.is_none() {
            self.tides.api_key = std::env::var(TIDES_KEY_ENV).ok();
        }
        if self.weather.api_key.is_none() {
            self.weather.api_key = std::env::var(WEATHER_KEY_ENV).ok();
        }
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.server.host.is_empty() {
            self.server.host = default_host();
        }
        if self.server.request_timeout_seconds == 0 {
            self.server.request_timeout_seconds = default_request_timeout();
        }
        if self.tides.base_url.is_empty() {
            self.tides.base_url = default_tides_base_url();
        }
        if self.tides.timeout_seconds == 0 {
            self.tides.timeout_seconds = default_upstream_timeout();
        }
        if self.tides.window_hours == 0 {
            self.tides.window_hours = default_window_hours();
        }
        if self.tides.display_count < 2 {
            self.tides.display_count = 2;
        }
        if self.weather.base_url.is_empty() {
            self.weather.base_url = default_weather_base_url();
        }
        if self.weather.timeout_seconds == 0 {
            self.weather.timeout_seconds = default_upstream_timeout();
        }
        if self.weather.forecast_points == 0 {
            self.weather.forecast_points = default_forecast_points();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        // Blank keys behave like absent ones
        for key in [&mut self.tides.api_key, &mut self.weather.api_key] {
            if key.as_ref().is_some_and(|k| k.trim().is_empty()) {
                *key = None;
            }
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        self.validate_activities()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.tides.timeout_seconds > 60 {
            return Err(TideCastError::config("Tide API timeout cannot exceed 60 seconds").into());
        }

        if self.weather.timeout_seconds > 60 {
            return Err(
                TideCastError::config("Weather API timeout cannot exceed 60 seconds").into(),
            );
        }

        if self.tides.max_retries > 3 || self.weather.max_retries > 3 {
            return Err(TideCastError::config("Upstream max retries cannot exceed 3").into());
        }

        if self.server.request_timeout_seconds > 300 {
            return Err(
                TideCastError::config("Request timeout cannot exceed 300 seconds").into(),
            );
        }

        if !(1..=1440).contains(&self.cache.ttl_minutes) {
            return Err(TideCastError::config(
                "Cache TTL must be between 1 and 1440 minutes (24 hours)",
            )
            .into());
        }

        if self.cache.key_precision > 6 {
            return Err(
                TideCastError::config("Cache key precision cannot exceed 6 decimal places").into(),
            );
        }

        if self.tides.window_hours > 168 {
            return Err(TideCastError::config("Tide window cannot exceed 168 hours").into());
        }

        if self.scoring.safe_tide_min >= self.scoring.safe_tide_max {
            return Err(TideCastError::config(
                "Safe tide range minimum must be below its maximum",
            )
            .into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(TideCastError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(TideCastError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("Tide", &self.tides.base_url),
            ("Weather", &self.weather.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(TideCastError::config(format!(
                    "{name} API base URL must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Validate the activity profiles used for scoring
    fn validate_activities(&self) -> Result<()> {
        if self.scoring.activities.is_empty() {
            return Err(TideCastError::config("At least one activity profile is required").into());
        }

        let mut seen = HashSet::new();
        for profile in &self.scoring.activities {
            if profile.name.trim().is_empty() {
                return Err(TideCastError::config("Activity names cannot be empty").into());
            }
            if !seen.insert(profile.name.as_str()) {
                return Err(TideCastError::config(format!(
                    "Duplicate activity profile '{}'",
                    profile.name
                ))
                .into());
            }
            if profile.ideal_wind_min > profile.ideal_wind_max {
                return Err(TideCastError::config(format!(
                    "Activity '{}' has an empty ideal wind band",
                    profile.name
                ))
                .into());
            }
        }

        Ok(())
    }
}
