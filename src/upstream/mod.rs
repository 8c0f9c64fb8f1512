//! Clients for the third-party tide and weather feeds
//!
//! Both providers sit behind a trait so the forecast service can be driven
//! by in-memory fakes in tests. The HTTP implementations share one client
//! construction path: a per-request timeout plus a single retry on
//! transient failures (timeouts, connection errors, 5xx). A 4xx is never
//! retried.

pub mod open_weather;
pub mod world_tides;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{
    RetryTransientMiddleware, Retryable, RetryableStrategy, default_on_request_failure,
};
use std::time::Duration as StdDuration;

use crate::error::{Service, TideCastError};
use crate::models::{Coordinate, LocalZone, RawExtremum, WeatherObservation};

pub use open_weather::OpenWeatherClient;
pub use world_tides::WorldTidesClient;

const USER_AGENT: &str = concat!("tidecast/", env!("CARGO_PKG_VERSION"));

/// Time span of tide extrema to request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TideWindow {
    pub start: DateTime<Utc>,
    pub length: Duration,
}

impl TideWindow {
    /// Window starting at local midnight of `now` in `zone`
    #[must_use]
    pub fn local_day(zone: &LocalZone, now: DateTime<Utc>, hours: u32) -> Self {
        Self {
            start: zone.local_midnight(now),
            length: Duration::hours(i64::from(hours)),
        }
    }

    /// Same start, twice the length
    #[must_use]
    pub fn doubled(&self) -> Self {
        Self {
            start: self.start,
            length: self.length * 2,
        }
    }

    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.length
    }
}

/// Source of tide extrema
#[async_trait]
pub trait TideProvider: Send + Sync {
    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    /// Extrema inside `window`, in any order
    async fn fetch_tides(
        &self,
        coordinate: &Coordinate,
        window: &TideWindow,
    ) -> Result<Vec<RawExtremum>, TideCastError>;
}

/// Source of current weather and a short forecast
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    async fn fetch_weather(
        &self,
        coordinate: &Coordinate,
    ) -> Result<WeatherObservation, TideCastError>;
}

/// Retry 5xx and transport failures, never client errors
struct TransientOnly;

impl RetryableStrategy for TransientOnly {
    fn handle(
        &self,
        res: &Result<reqwest::Response, reqwest_middleware::Error>,
    ) -> Option<Retryable> {
        match res {
            Ok(response) if response.status().is_server_error() => Some(Retryable::Transient),
            Ok(response) if response.status().is_client_error() => Some(Retryable::Fatal),
            Ok(_) => None,
            Err(error) => default_on_request_failure(error),
        }
    }
}

/// HTTP client with timeout and retry middleware
pub fn build_http_client(
    service: Service,
    timeout_seconds: u32,
    max_retries: u32,
) -> Result<ClientWithMiddleware, TideCastError> {
    let client = reqwest::Client::builder()
        .timeout(StdDuration::from_secs(u64::from(timeout_seconds)))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| {
            TideCastError::internal(format!("Failed to create HTTP client for {service}: {e}"))
        })?;

    let policy = ExponentialBackoff::builder()
        .retry_bounds(StdDuration::from_millis(100), StdDuration::from_secs(1))
        .build_with_max_retries(max_retries);

    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy_and_strategy(
            policy,
            TransientOnly,
        ))
        .build())
}

/// Map a non-success HTTP status to the matching error
pub(crate) fn status_error(service: Service, status: StatusCode, detail: &str) -> TideCastError {
    let detail = if detail.is_empty() {
        status.canonical_reason().unwrap_or("no detail")
    } else {
        detail
    };
    if status.is_client_error() {
        TideCastError::rejected(service, status.as_u16(), detail)
    } else {
        TideCastError::unavailable(service, format!("HTTP {}: {detail}", status.as_u16()))
    }
}

/// Map a transport failure, keeping the request URL (and its key) out of the message
pub(crate) fn transport_error(service: Service, error: reqwest_middleware::Error) -> TideCastError {
    let message = match error {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => "request timed out".to_string(),
        reqwest_middleware::Error::Reqwest(e) if e.is_connect() => {
            format!("connection failed: {}", e.without_url())
        }
        reqwest_middleware::Error::Reqwest(e) => e.without_url().to_string(),
        reqwest_middleware::Error::Middleware(e) => e.to_string(),
    };
    TideCastError::unavailable(service, message)
}
