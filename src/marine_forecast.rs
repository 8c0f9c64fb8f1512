//! Marine forecast service
//!
//! Orchestrates a bundle build for one coordinate: validate, consult the
//! cache, fetch tides and weather concurrently, derive tide events, score
//! activities and pick a recommendation. When exactly one upstream fails
//! the bundle is served without that section; when both fail the request
//! fails with the tide error.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cache::{AggregationCache, BuildOutcome};
use crate::config::{ScoringConfig, TideCastConfig};
use crate::error::{Service, TideCastError};
use crate::health::{HealthReport, HealthReporter, ServiceProbes};
use crate::marine::{self, MarineAssessment, TideAnalysis};
use crate::models::{
    BundleLocation, BundleResponse, Coordinate, ForecastPoint, LocalZone, TideEvent,
    TideWeatherBundle, WeatherObservation, WeatherReport,
};
use crate::upstream::{
    OpenWeatherClient, TideProvider, TideWindow, WeatherProvider, WorldTidesClient,
};

/// Everything a build needs, cheap to clone into a detached task
#[derive(Clone)]
struct BundleBuilder {
    tides: Arc<dyn TideProvider>,
    weather: Arc<dyn WeatherProvider>,
    scoring: Arc<ScoringConfig>,
    probes: Arc<ServiceProbes>,
    window_hours: u32,
    display_count: usize,
}

impl BundleBuilder {
    #[instrument(name = "build_bundle", skip(self), fields(coordinates = %coordinate.format_coordinates(), %zone))]
    async fn build(
        self,
        coordinate: Coordinate,
        zone: LocalZone,
    ) -> Result<BuildOutcome, TideCastError> {
        let now = Utc::now();

        let (tides, weather) = tokio::join!(
            self.load_tides(&coordinate, now, &zone),
            self.weather.fetch_weather(&coordinate)
        );
        self.record_probe(Service::TidesApi, tides.as_ref().err());
        self.record_probe(Service::WeatherApi, weather.as_ref().err());

        let (analysis, observation, failure) = match (tides, weather) {
            (Ok(analysis), Ok(observation)) => (Some(analysis), Some(observation), None),
            (Ok(analysis), Err(error)) => {
                warn!(%error, "Weather unavailable, serving tides only");
                (Some(analysis), None, Some(error))
            }
            (Err(error), Ok(observation)) => {
                warn!(%error, "Tides unavailable, serving weather only");
                (None, Some(observation), Some(error))
            }
            (Err(tide_error), Err(weather_error)) => {
                warn!(%weather_error, "Weather unavailable as well");
                return Err(tide_error);
            }
        };

        let bundle = self.assemble(
            coordinate,
            analysis,
            observation,
            now,
            &zone,
            failure.as_ref().and_then(TideCastError::service),
        );

        Ok(match failure {
            None => BuildOutcome::Complete(bundle),
            Some(error) => BuildOutcome::Partial {
                bundle,
                transient: error.is_transient(),
            },
        })
    }

    /// Fetch and derive tides, widening the window once if too few events lie ahead
    async fn load_tides(
        &self,
        coordinate: &Coordinate,
        now: DateTime<Utc>,
        zone: &LocalZone,
    ) -> Result<TideAnalysis, TideCastError> {
        let window = TideWindow::local_day(zone, now, self.window_hours);
        let extrema = self.tides.fetch_tides(coordinate, &window).await?;
        let analysis = marine::analyze(extrema, now, zone, self.display_count);

        let ahead = analysis.future_events().count();
        if ahead >= 2 {
            return Ok(analysis);
        }

        debug!(ahead, "Too few upcoming tides, widening the window");
        match self.tides.fetch_tides(coordinate, &window.doubled()).await {
            Ok(extrema) => {
                let wider = marine::analyze(extrema, now, zone, self.display_count);
                if wider.future_events().count() > ahead {
                    return Ok(wider);
                }
                Ok(analysis)
            }
            Err(error) => {
                warn!(%error, "Wider tide window failed, keeping the first result");
                Ok(analysis)
            }
        }
    }

    fn record_probe(&self, service: Service, error: Option<&TideCastError>) {
        // Missing credentials are reported separately
        if matches!(error, Some(TideCastError::MisconfiguredService { .. })) {
            return;
        }
        self.probes.record(service, error.is_none());
    }

    fn assemble(
        &self,
        coordinate: Coordinate,
        analysis: Option<TideAnalysis>,
        observation: Option<WeatherObservation>,
        now: DateTime<Utc>,
        zone: &LocalZone,
        unavailable: Option<Service>,
    ) -> TideWeatherBundle {
        let analysis = analysis.unwrap_or_default();
        let upcoming: Vec<TideEvent> = analysis.future_events().copied().collect();

        let assessment: Option<MarineAssessment> = observation
            .as_ref()
            .map(|o| marine::assess(&self.scoring, &o.current, &analysis.state));

        let recommendations = marine::recommend(
            assessment
                .as_ref()
                .map_or(&[][..], |a| a.activities.as_slice()),
            observation.as_ref().map(|o| &o.current),
            &upcoming,
        );

        let name = observation.as_ref().and_then(|o| o.location_name.clone());
        let weather = observation.map(|o| WeatherReport {
            forecast: o
                .forecast
                .into_iter()
                .map(|sample| ForecastPoint {
                    time: zone.to_local(sample.time).format("%H:%M").to_string(),
                    temperature: sample.temperature,
                    condition: sample.condition,
                    wind_speed: sample.wind_speed,
                    precipitation: sample.precipitation,
                })
                .collect(),
            current: o.current,
        });

        TideWeatherBundle {
            location: BundleLocation {
                lat: coordinate.lat,
                lon: coordinate.lon,
                name,
            },
            next_tides: analysis.upcoming,
            daily_summary: analysis.summary,
            weather,
            marine_conditions: assessment.map(|a| a.conditions),
            recommendations,
            unavailable: unavailable.into_iter().collect(),
            generated_at: now,
        }
    }
}

/// Entry point for bundle queries, cache invalidation and health
pub struct MarineForecastService {
    cache: Arc<AggregationCache>,
    builder: BundleBuilder,
    health: HealthReporter,
    key_precision: u32,
}

impl MarineForecastService {
    /// Wire the service to explicit providers
    pub fn new(
        config: &TideCastConfig,
        tides: Arc<dyn TideProvider>,
        weather: Arc<dyn WeatherProvider>,
    ) -> Self {
        let cache = Arc::new(AggregationCache::new(
            Duration::from_secs(u64::from(config.cache.ttl_minutes) * 60),
            Duration::from_secs(u64::from(config.cache.stale_grace_minutes) * 60),
        ));
        Self::with_cache(config, tides, weather, cache)
    }

    /// Wire the service to an existing cache
    pub fn with_cache(
        config: &TideCastConfig,
        tides: Arc<dyn TideProvider>,
        weather: Arc<dyn WeatherProvider>,
        cache: Arc<AggregationCache>,
    ) -> Self {
        let probes = Arc::new(ServiceProbes::default());
        let health = HealthReporter::new(
            Arc::clone(&cache),
            Arc::clone(&probes),
            tides.is_configured(),
            weather.is_configured(),
        );

        if !tides.is_configured() {
            warn!("No tide API key configured; tide data will be unavailable");
        }
        if !weather.is_configured() {
            warn!("No weather API key configured; weather data will be unavailable");
        }

        Self {
            cache,
            builder: BundleBuilder {
                tides,
                weather,
                scoring: Arc::new(config.scoring.clone()),
                probes,
                window_hours: config.tides.window_hours,
                display_count: config.tides.display_count,
            },
            health,
            key_precision: config.cache.key_precision,
        }
    }

    /// Build the service with the HTTP clients described by `config`
    pub fn from_config(config: &TideCastConfig) -> Result<Self, TideCastError> {
        let tides = Arc::new(WorldTidesClient::new(&config.tides)?);
        let weather = Arc::new(OpenWeatherClient::new(&config.weather)?);
        Ok(Self::new(config, tides, weather))
    }

    /// Bundle for a coordinate, served from cache when fresh
    pub async fn forecast(&self, lat: f64, lon: f64) -> Result<BundleResponse, TideCastError> {
        self.forecast_in_zone(lat, lon, None).await
    }

    /// Bundle whose local day and labels follow `timezone` (an IANA name)
    /// instead of the longitude estimate
    #[instrument(skip(self))]
    pub async fn forecast_in_zone(
        &self,
        lat: f64,
        lon: f64,
        timezone: Option<&str>,
    ) -> Result<BundleResponse, TideCastError> {
        let coordinate = Coordinate::new(lat, lon)?;
        let zone = timezone
            .filter(|name| !name.trim().is_empty())
            .map(LocalZone::from_name)
            .transpose()?;
        let key = coordinate.cache_key(self.key_precision).with_zone(zone);
        let builder = self.builder.clone();

        let (bundle, status) = self
            .cache
            .get_or_build(key, move || builder.build(key.coordinate(), key.zone()))
            .await?;

        info!(%key, cache = ?status, tides = bundle.next_tides.len(), "Bundle served");
        Ok(BundleResponse::new(&bundle, status, Utc::now()))
    }

    /// Drop every cached bundle; returns how many were removed
    pub async fn clear_cache(&self) -> usize {
        self.cache.clear().await
    }

    pub async fn health(&self) -> HealthReport {
        self.health.report().await
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<AggregationCache> {
        &self.cache
    }
}
