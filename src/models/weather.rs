//! Weather data models and display helpers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current conditions at the queried coordinate
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WeatherSnapshot {
    /// Temperature in Celsius
    pub temperature: f64,
    /// Apparent temperature in Celsius
    pub feels_like: f64,
    /// Human-readable description of weather conditions
    pub condition: String,
    /// Wind speed in m/s
    pub wind_speed: f64,
    /// Wind direction in degrees (0-360, where 0/360 is North)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<u16>,
    /// Relative humidity in percent
    pub humidity: u8,
    /// Visibility in kilometers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
    /// Atmospheric pressure in hPa
    pub pressure: u32,
}

impl WeatherSnapshot {
    /// Convert wind direction from degrees to cardinal direction
    #[must_use]
    pub fn wind_direction_to_cardinal(degrees: u16) -> &'static str {
        match degrees {
            0..=11 | 349..=360 => "N",
            12..=33 => "NNE",
            34..=56 => "NE",
            57..=78 => "ENE",
            79..=101 => "E",
            102..=123 => "ESE",
            124..=146 => "SE",
            147..=168 => "SSE",
            169..=191 => "S",
            192..=213 => "SSW",
            214..=236 => "SW",
            237..=258 => "WSW",
            259..=281 => "W",
            282..=303 => "WNW",
            304..=326 => "NW",
            327..=348 => "NNW",
            _ => "Unknown",
        }
    }

    /// Format wind information
    #[must_use]
    pub fn format_wind(&self) -> String {
        match self.wind_direction {
            Some(deg) => format!(
                "{:.1} m/s {}",
                self.wind_speed,
                Self::wind_direction_to_cardinal(deg)
            ),
            None => format!("{:.1} m/s", self.wind_speed),
        }
    }

    /// Whether the condition text mentions rain, snow or storms
    #[must_use]
    pub fn has_precipitation(&self) -> bool {
        let condition = self.condition.to_lowercase();
        ["rain", "drizzle", "shower", "snow", "sleet", "thunder", "storm"]
            .iter()
            .any(|k| condition.contains(k))
    }

    #[must_use]
    pub fn has_thunderstorm(&self) -> bool {
        self.condition.to_lowercase().contains("thunder")
    }
}

/// Forecast slot as parsed from the weather provider
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSample {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub condition: String,
    pub wind_speed: f64,
    /// Rain plus snow in mm over the slot
    pub precipitation: f64,
}

/// Forecast slot as presented to clients
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ForecastPoint {
    /// Local wall-clock label, `HH:MM`
    pub time: String,
    pub temperature: f64,
    pub condition: String,
    pub wind_speed: f64,
    pub precipitation: f64,
}

/// Everything the weather provider returned for one coordinate
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObservation {
    pub current: WeatherSnapshot,
    /// Place name reported by the provider
    pub location_name: Option<String>,
    /// Nearest first
    pub forecast: Vec<ForecastSample>,
}

/// Weather section of the bundle
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WeatherReport {
    pub current: WeatherSnapshot,
    pub forecast: Vec<ForecastPoint>,
}
