//! In-memory providers shared by the integration tests

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tidecast::error::{Service, TideCastError};
use tidecast::models::{
    Coordinate, ForecastSample, RawExtremum, TideType, WeatherObservation, WeatherSnapshot,
};
use tidecast::upstream::{TideProvider, TideWindow, WeatherProvider};

/// Semidiurnal series around the fetch time: highs of 1.8 m every 12 h
/// starting one hour from now, lows of 0.2 m in between.
fn semidiurnal() -> Vec<RawExtremum> {
    let now = Utc::now();
    (-4..=4)
        .map(|step: i64| {
            let kind = if step % 2 == 0 {
                TideType::High
            } else {
                TideType::Low
            };
            RawExtremum {
                time: now + chrono::Duration::hours(1 + 6 * step),
                height: if kind == TideType::High { 1.8 } else { 0.2 },
                kind: Some(kind),
            }
        })
        .collect()
}

pub struct MockTides {
    calls: AtomicUsize,
    failure: Mutex<Option<TideCastError>>,
    delay: Duration,
}

impl MockTides {
    pub fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, error: TideCastError) {
        *self.failure.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl TideProvider for MockTides {
    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch_tides(
        &self,
        _coordinate: &Coordinate,
        _window: &TideWindow,
    ) -> Result<Vec<RawExtremum>, TideCastError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failure = self.failure.lock().unwrap().clone();
        match failure {
            Some(error) => Err(error),
            None => Ok(semidiurnal()),
        }
    }
}

pub struct MockWeather {
    calls: AtomicUsize,
    wind_speed: f64,
    failure: Mutex<Option<TideCastError>>,
}

impl MockWeather {
    pub fn calm() -> Self {
        Self::with_wind(3.0)
    }

    pub fn with_wind(wind_speed: f64) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            wind_speed,
            failure: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_with(&self, error: TideCastError) {
        *self.failure.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl WeatherProvider for MockWeather {
    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch_weather(
        &self,
        _coordinate: &Coordinate,
    ) -> Result<WeatherObservation, TideCastError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(WeatherObservation {
            current: WeatherSnapshot {
                temperature: 22.0,
                feels_like: 22.0,
                condition: "Clear Sky".to_string(),
                wind_speed: self.wind_speed,
                wind_direction: Some(180),
                humidity: 60,
                visibility: Some(10.0),
                pressure: 1015,
            },
            location_name: Some("New York".to_string()),
            forecast: vec![ForecastSample {
                time: Utc::now() + chrono::Duration::hours(3),
                temperature: 23.0,
                condition: "Few Clouds".to_string(),
                wind_speed: self.wind_speed,
                precipitation: 0.0,
            }],
        })
    }
}

pub fn tides_down() -> TideCastError {
    TideCastError::unavailable(Service::TidesApi, "connection reset")
}

pub fn weather_down() -> TideCastError {
    TideCastError::unavailable(Service::WeatherApi, "timed out")
}
