//! Service health: credentials, last upstream outcome and cache size.
//!
//! Healthy means both upstreams are configured and the last call to each
//! succeeded. An upstream not yet called since startup counts as unproven.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::cache::AggregationCache;
use crate::error::Service;

const PROBE_OK: u8 = 1;
const PROBE_FAILED: u8 = 2;

/// Outcome of the most recent call to an upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    /// Not called since startup
    Unknown,
    Ok,
    Failed,
}

/// Last-call outcome per upstream, updated by the forecast service.
///
/// Zero (the default) means the upstream has not been called yet.
#[derive(Debug, Default)]
pub struct ServiceProbes {
    tides: AtomicU8,
    weather: AtomicU8,
}

impl ServiceProbes {
    fn slot(&self, service: Service) -> &AtomicU8 {
        match service {
            Service::TidesApi => &self.tides,
            Service::WeatherApi => &self.weather,
        }
    }

    pub fn record(&self, service: Service, success: bool) {
        let value = if success { PROBE_OK } else { PROBE_FAILED };
        self.slot(service).store(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn state(&self, service: Service) -> ProbeState {
        match self.slot(service).load(Ordering::Relaxed) {
            PROBE_OK => ProbeState::Ok,
            PROBE_FAILED => ProbeState::Failed,
            _ => ProbeState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    Configured,
    MissingCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceMap<T> {
    pub tides_api: T,
    pub weather_api: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    /// Bundles still within their TTL
    pub cache_entries: usize,
    /// Expired bundles kept only as a fallback
    pub stale_entries: usize,
    pub services: ServiceMap<CredentialState>,
    pub last_probe: ServiceMap<ProbeState>,
}

/// Read-only view over the pieces that make up service health
pub struct HealthReporter {
    cache: Arc<AggregationCache>,
    probes: Arc<ServiceProbes>,
    tides_configured: bool,
    weather_configured: bool,
}

impl HealthReporter {
    #[must_use]
    pub fn new(
        cache: Arc<AggregationCache>,
        probes: Arc<ServiceProbes>,
        tides_configured: bool,
        weather_configured: bool,
    ) -> Self {
        Self {
            cache,
            probes,
            tides_configured,
            weather_configured,
        }
    }

    pub async fn report(&self) -> HealthReport {
        let credentials = |configured: bool| {
            if configured {
                CredentialState::Configured
            } else {
                CredentialState::MissingCredentials
            }
        };
        let last_probe = ServiceMap {
            tides_api: self.probes.state(Service::TidesApi),
            weather_api: self.probes.state(Service::WeatherApi),
        };

        let healthy = self.tides_configured
            && self.weather_configured
            && last_probe.tides_api == ProbeState::Ok
            && last_probe.weather_api == ProbeState::Ok;
        let cache_entries = self.cache.fresh_len().await;
        let stale_entries = self.cache.len().await.saturating_sub(cache_entries);

        HealthReport {
            status: if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
            cache_entries,
            stale_entries,
            services: ServiceMap {
                tides_api: credentials(self.tides_configured),
                weather_api: credentials(self.weather_configured),
            },
            last_probe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn reporter(tides: bool, weather: bool) -> (HealthReporter, Arc<ServiceProbes>) {
        let cache = Arc::new(AggregationCache::new(
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        reporter_over(cache, tides, weather)
    }

    fn reporter_over(
        cache: Arc<AggregationCache>,
        tides: bool,
        weather: bool,
    ) -> (HealthReporter, Arc<ServiceProbes>) {
        let probes = Arc::new(ServiceProbes::default());
        (
            HealthReporter::new(cache, Arc::clone(&probes), tides, weather),
            probes,
        )
    }

    #[tokio::test]
    async fn test_degraded_until_both_upstreams_answer() {
        let (reporter, probes) = reporter(true, true);
        let report = reporter.report().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.cache_entries, 0);
        assert_eq!(report.last_probe.tides_api, ProbeState::Unknown);

        probes.record(Service::TidesApi, true);
        assert_eq!(reporter.report().await.status, HealthStatus::Degraded);

        probes.record(Service::WeatherApi, true);
        assert_eq!(reporter.report().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_expired_bundles_are_counted_as_stale() {
        use crate::models::{BundleLocation, Coordinate, Recommendation, TideWeatherBundle};

        let cache = Arc::new(AggregationCache::new(
            Duration::from_millis(20),
            Duration::from_secs(60),
        ));
        let (reporter, _) = reporter_over(Arc::clone(&cache), true, true);
        let key = Coordinate::new(10.0, 20.0).unwrap().cache_key(3);
        cache
            .get_or_build(key, || async {
                Ok(crate::cache::BuildOutcome::Complete(TideWeatherBundle {
                    location: BundleLocation {
                        lat: 10.0,
                        lon: 20.0,
                        name: None,
                    },
                    next_tides: vec![],
                    daily_summary: None,
                    weather: None,
                    marine_conditions: None,
                    recommendations: Recommendation {
                        best_activity: "beach walking".to_string(),
                        best_time: None,
                        tips: vec![],
                    },
                    unavailable: vec![],
                    generated_at: Utc::now(),
                }))
            })
            .await
            .unwrap();

        let report = reporter.report().await;
        assert_eq!((report.cache_entries, report.stale_entries), (1, 0));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = reporter.report().await;
        assert_eq!((report.cache_entries, report.stale_entries), (0, 1));
    }

    #[tokio::test]
    async fn test_missing_credentials_degrade() {
        let (reporter, _) = reporter(true, false);
        let report = reporter.report().await;
        assert_eq!(report.status, HealthStatus::Degraded);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["services"]["tides_api"], "configured");
        assert_eq!(json["services"]["weather_api"], "missing_credentials");
        assert_eq!(json["status"], "degraded");
    }

    #[tokio::test]
    async fn test_failed_call_degrades_until_recovery() {
        let (reporter, probes) = reporter(true, true);
        probes.record(Service::TidesApi, true);
        probes.record(Service::WeatherApi, false);
        assert_eq!(reporter.report().await.status, HealthStatus::Degraded);

        probes.record(Service::WeatherApi, true);
        assert_eq!(reporter.report().await.status, HealthStatus::Healthy);
    }
}
