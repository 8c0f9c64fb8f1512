use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::{ErrorKind, Service, TideCastError};
use crate::health::HealthReport;
use crate::marine_forecast::MarineForecastService;
use crate::models::BundleResponse;

type AppState = Arc<MarineForecastService>;

/// Raw query string; parsed by hand so bad numbers get the structured error body
#[derive(Debug, Deserialize)]
pub struct CoordinateQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
    /// IANA zone name for the local day and forecast labels
    pub timezone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct ServiceBanner {
    pub service: &'static str,
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    kind: ErrorKind,
    message: String,
    hint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    service: Option<Service>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retry_suggested: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

fn status_for(error: &TideCastError) -> StatusCode {
    match error {
        TideCastError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        TideCastError::NotFound { .. } => StatusCode::NOT_FOUND,
        TideCastError::MisconfiguredService { .. }
        | TideCastError::UpstreamRejected { .. }
        | TideCastError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        TideCastError::Config { .. } | TideCastError::Internal { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for TideCastError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
                hint: self.user_message(),
                service: self.service(),
                retry_suggested: self.is_transient(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/tides", get(get_tides))
        .route("/cache/clear", post(clear_cache))
        .route("/health", get(health))
        .with_state(service)
}

/// Fallback for unmatched routes
pub async fn not_found(uri: Uri) -> TideCastError {
    TideCastError::not_found(format!("No route for {}", uri.path()))
}

async fn banner() -> Json<ServiceBanner> {
    Json(ServiceBanner {
        service: "tidecast",
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn parse_degrees(name: &str, value: Option<&str>) -> Result<f64, TideCastError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            TideCastError::invalid_input(format!("Missing required query parameter '{name}'"))
        })?;
    raw.parse::<f64>().map_err(|_| {
        TideCastError::invalid_input(format!("'{name}' must be a number, got: {raw}"))
    })
}

async fn get_tides(
    State(service): State<AppState>,
    Query(query): Query<CoordinateQuery>,
) -> Result<Json<BundleResponse>, TideCastError> {
    let lat = parse_degrees("lat", query.lat.as_deref())?;
    let lon = parse_degrees("lon", query.lon.as_deref())?;
    Ok(Json(
        service
            .forecast_in_zone(lat, lon, query.timezone.as_deref())
            .await?,
    ))
}

async fn clear_cache(State(service): State<AppState>) -> Json<ClearResponse> {
    let cleared = service.clear_cache().await;
    Json(ClearResponse {
        message: "Cache cleared successfully".to_string(),
        cleared,
    })
}

async fn health(State(service): State<AppState>) -> Json<HealthReport> {
    Json(service.health().await)
}
