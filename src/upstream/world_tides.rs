use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{TideProvider, TideWindow, build_http_client, status_error, transport_error};
use crate::config::TidesConfig;
use crate::error::{Service, TideCastError};
use crate::models::{Coordinate, RawExtremum, TideType};

/// WorldTides v3 extremes client
pub struct WorldTidesClient {
    client: ClientWithMiddleware,
    api_key: Option<String>,
    base_url: String,
}

/// Top-level WorldTides payload; errors may arrive with HTTP 200
#[derive(Debug, Deserialize)]
struct ExtremesResponse {
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    extremes: Option<Vec<Extreme>>,
}

#[derive(Debug, Deserialize)]
struct Extreme {
    /// Unix timestamp in seconds
    dt: i64,
    height: f64,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl Extreme {
    fn into_raw(self) -> Option<RawExtremum> {
        let time = DateTime::from_timestamp(self.dt, 0)?;
        let kind = match self.kind.as_deref() {
            Some(k) if k.eq_ignore_ascii_case("high") => Some(TideType::High),
            Some(k) if k.eq_ignore_ascii_case("low") => Some(TideType::Low),
            _ => None,
        };
        Some(RawExtremum {
            time,
            height: self.height,
            kind,
        })
    }
}

impl WorldTidesClient {
    /// Create a new client
    pub fn new(config: &TidesConfig) -> Result<Self, TideCastError> {
        Ok(Self {
            client: build_http_client(
                Service::TidesApi,
                config.timeout_seconds,
                config.max_retries,
            )?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request_url(
        &self,
        api_key: &str,
        coordinate: &Coordinate,
        window: &TideWindow,
    ) -> Result<Url, TideCastError> {
        Url::parse_with_params(
            &self.base_url,
            &[
                ("extremes", String::new()),
                ("lat", coordinate.lat.to_string()),
                ("lon", coordinate.lon.to_string()),
                ("key", api_key.to_string()),
                ("start", window.start.timestamp().to_string()),
                ("length", window.length.num_seconds().to_string()),
            ],
        )
        .map_err(|e| TideCastError::config(format!("Invalid tide API base URL: {e}")))
    }
}

#[async_trait]
impl TideProvider for WorldTidesClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self, window), fields(coordinates = %coordinate.format_coordinates()))]
    async fn fetch_tides(
        &self,
        coordinate: &Coordinate,
        window: &TideWindow,
    ) -> Result<Vec<RawExtremum>, TideCastError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(TideCastError::misconfigured(
                Service::TidesApi,
                "WorldTides API key is not set",
            ));
        };

        let url = self.request_url(api_key, coordinate, window)?;
        debug!(
            start = %window.start,
            length_s = window.length.num_seconds(),
            "Requesting tide extremes"
        );
        let start_time = Instant::now();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(Service::TidesApi, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TideCastError::unavailable(Service::TidesApi, e.without_url().to_string()))?;

        let parsed: Option<ExtremesResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let detail = parsed.and_then(|p| p.error).unwrap_or_default();
            warn!(status = status.as_u16(), "Tide API returned an error status");
            return Err(status_error(Service::TidesApi, status, &detail));
        }

        let Some(parsed) = parsed else {
            return Err(TideCastError::unavailable(
                Service::TidesApi,
                "unreadable tide payload",
            ));
        };

        if let Some(code) = parsed.status.filter(|code| *code >= 400) {
            let detail = parsed.error.unwrap_or_default();
            warn!(status = code, error = %detail, "Tide API reported an error in the body");
            let status = reqwest::StatusCode::from_u16(code)
                .unwrap_or(reqwest::StatusCode::BAD_GATEWAY);
            return Err(status_error(Service::TidesApi, status, &detail));
        }

        let Some(extremes) = parsed.extremes else {
            return Err(TideCastError::unavailable(
                Service::TidesApi,
                "tide payload has no extremes",
            ));
        };

        let extrema: Vec<RawExtremum> = extremes.into_iter().filter_map(Extreme::into_raw).collect();

        info!(
            count = extrema.len(),
            "Retrieved tide extremes in {:.3}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok(extrema)
    }
}
