//! Error types and handling for `Tidecast`

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upstream data source an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    /// WorldTides extrema feed
    TidesApi,
    /// OpenWeatherMap current conditions and forecast
    WeatherApi,
}

impl Service {
    /// Key used in health reports and error bodies
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Service::TidesApi => "tides_api",
            Service::WeatherApi => "weather_api",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse category of a failure, used by callers to pick a recovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    MisconfiguredService,
    UpstreamUnavailable,
    UpstreamRejected,
    NotFound,
    Config,
    Internal,
}

/// Main error type for the `Tidecast` service
///
/// Every variant only carries owned strings so a single build failure can be
/// cloned to every caller waiting on the same cache key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TideCastError {
    /// Malformed or out-of-range request input
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Upstream credentials are absent
    #[error("Service misconfigured ({service}): {message}")]
    MisconfiguredService { service: Service, message: String },

    /// Timeout, connection failure, 5xx or unreadable upstream payload
    #[error("Upstream {service} unavailable: {message}")]
    UpstreamUnavailable { service: Service, message: String },

    /// Upstream answered with a 4xx (bad key, bad coordinates)
    #[error("Upstream {service} rejected the request ({status}): {message}")]
    UpstreamRejected {
        service: Service,
        status: u16,
        message: String,
    },

    /// Request did not match any route
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TideCastError {
    /// Create a new input validation error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a new missing-credentials error for an upstream
    pub fn misconfigured<S: Into<String>>(service: Service, message: S) -> Self {
        Self::MisconfiguredService {
            service,
            message: message.into(),
        }
    }

    /// Create a new transient upstream error
    pub fn unavailable<S: Into<String>>(service: Service, message: S) -> Self {
        Self::UpstreamUnavailable {
            service,
            message: message.into(),
        }
    }

    /// Create a new upstream rejection error
    pub fn rejected<S: Into<String>>(service: Service, status: u16, message: S) -> Self {
        Self::UpstreamRejected {
            service,
            status,
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            TideCastError::InvalidInput { .. } => ErrorKind::InvalidInput,
            TideCastError::MisconfiguredService { .. } => ErrorKind::MisconfiguredService,
            TideCastError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            TideCastError::UpstreamRejected { .. } => ErrorKind::UpstreamRejected,
            TideCastError::NotFound { .. } => ErrorKind::NotFound,
            TideCastError::Config { .. } => ErrorKind::Config,
            TideCastError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Upstream that caused the failure, if any
    #[must_use]
    pub fn service(&self) -> Option<Service> {
        match self {
            TideCastError::MisconfiguredService { service, .. }
            | TideCastError::UpstreamUnavailable { service, .. }
            | TideCastError::UpstreamRejected { service, .. } => Some(*service),
            _ => None,
        }
    }

    /// Whether a stale cache entry may stand in for this failure
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, TideCastError::UpstreamUnavailable { .. })
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            TideCastError::InvalidInput { message } => {
                format!(
                    "Invalid input: {message}. Latitude must be within -90..90, longitude within -180..180 and timezone, if given, an IANA name such as Europe/Madrid."
                )
            }
            TideCastError::MisconfiguredService { service, .. } => {
                format!("The {service} data source is not configured on the server.")
            }
            TideCastError::UpstreamUnavailable { service, .. } => {
                format!("The {service} data source is temporarily unavailable. Please retry shortly.")
            }
            TideCastError::UpstreamRejected { service, .. } => {
                format!("The {service} data source refused the request. This is a server configuration problem.")
            }
            TideCastError::NotFound { .. } => "The requested resource does not exist.".to_string(),
            TideCastError::Config { .. } => {
                "Configuration error. Please check your config file and API keys.".to_string()
            }
            TideCastError::Internal { .. } => "Unexpected server error.".to_string(),
        }
    }
}
