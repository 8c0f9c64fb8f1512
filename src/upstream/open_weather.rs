use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::{WeatherProvider, build_http_client, status_error, transport_error};
use crate::config::WeatherConfig;
use crate::error::{Service, TideCastError};
use crate::models::{Coordinate, ForecastSample, WeatherObservation, WeatherSnapshot};

/// OpenWeatherMap 2.5 client for current conditions and the 3-hourly forecast
pub struct OpenWeatherClient {
    client: ClientWithMiddleware,
    api_key: Option<String>,
    base_url: String,
    forecast_points: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
    #[serde(default)]
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(default, rename = "3h")]
    three_hours: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    main: CurrentMain,
    wind: Wind,
    #[serde(default)]
    weather: Vec<Condition>,
    /// Meters
    #[serde(default)]
    visibility: Option<f64>,
    #[serde(default)]
    name: Option<String>,
}

/// Current conditions require every field the snapshot reports
#[derive(Debug, Deserialize)]
struct CurrentMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastItem>,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: i64,
    main: ForecastMain,
    wind: Wind,
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default)]
    rain: Option<Volume>,
    #[serde(default)]
    snow: Option<Volume>,
}

/// "light rain" -> "Light Rain"; missing or blank -> "Unknown"
fn describe(conditions: &[Condition]) -> String {
    let description = conditions
        .first()
        .and_then(|c| c.description.as_deref())
        .map(str::trim)
        .unwrap_or_default();
    if description.is_empty() {
        return "Unknown".to_string();
    }
    description
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl CurrentResponse {
    fn into_observation(self) -> (WeatherSnapshot, Option<String>) {
        let snapshot = WeatherSnapshot {
            temperature: self.main.temp,
            feels_like: self.main.feels_like,
            condition: describe(&self.weather),
            wind_speed: self.wind.speed,
            wind_direction: self.wind.deg.map(|d| (d.rem_euclid(360.0)).round() as u16),
            humidity: self.main.humidity.round().clamp(0.0, 100.0) as u8,
            visibility: self.visibility.map(|m| m / 1000.0),
            pressure: self.main.pressure.round().max(0.0) as u32,
        };
        let name = self.name.filter(|n| !n.trim().is_empty());
        (snapshot, name)
    }
}

impl ForecastItem {
    fn into_sample(self) -> Option<ForecastSample> {
        let precipitation = self.rain.and_then(|v| v.three_hours).unwrap_or(0.0)
            + self.snow.and_then(|v| v.three_hours).unwrap_or(0.0);
        Some(ForecastSample {
            time: DateTime::from_timestamp(self.dt, 0)?,
            temperature: self.main.temp,
            condition: describe(&self.weather),
            wind_speed: self.wind.speed,
            precipitation,
        })
    }
}

impl OpenWeatherClient {
    /// Create a new client
    pub fn new(config: &WeatherConfig) -> Result<Self, TideCastError> {
        Ok(Self {
            client: build_http_client(
                Service::WeatherApi,
                config.timeout_seconds,
                config.max_retries,
            )?,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            forecast_points: config.forecast_points,
        })
    }

    fn endpoint(
        &self,
        resource: &str,
        api_key: &str,
        coordinate: &Coordinate,
        extra: &[(&str, &str)],
    ) -> Result<Url, TideCastError> {
        let mut params = vec![
            ("lat", coordinate.lat.to_string()),
            ("lon", coordinate.lon.to_string()),
            ("appid", api_key.to_string()),
            ("units", "metric".to_string()),
        ];
        params.extend(extra.iter().map(|(k, v)| (*k, (*v).to_string())));
        Url::parse_with_params(&format!("{}/{resource}", self.base_url), &params)
            .map_err(|e| TideCastError::config(format!("Invalid weather API base URL: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TideCastError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(Service::WeatherApi, e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            TideCastError::unavailable(Service::WeatherApi, e.without_url().to_string())
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_default();
            warn!(status = status.as_u16(), "Weather API returned an error status");
            return Err(status_error(Service::WeatherApi, status, &detail));
        }

        serde_json::from_str(&body).map_err(|e| {
            TideCastError::unavailable(
                Service::WeatherApi,
                format!("unreadable weather payload: {e}"),
            )
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self), fields(coordinates = %coordinate.format_coordinates()))]
    async fn fetch_weather(
        &self,
        coordinate: &Coordinate,
    ) -> Result<WeatherObservation, TideCastError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(TideCastError::misconfigured(
                Service::WeatherApi,
                "OpenWeatherMap API key is not set",
            ));
        };

        let count = self.forecast_points.to_string();
        let current_url = self.endpoint("weather", api_key, coordinate, &[])?;
        let forecast_url = self.endpoint("forecast", api_key, coordinate, &[("cnt", &count)])?;
        let start_time = Instant::now();

        let (current, forecast) = tokio::join!(
            self.get_json::<CurrentResponse>(current_url),
            self.get_json::<ForecastResponse>(forecast_url)
        );

        let (current, location_name) = current?.into_observation();

        let forecast = match forecast {
            Ok(forecast) => forecast
                .list
                .into_iter()
                .filter_map(ForecastItem::into_sample)
                .take(self.forecast_points)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Forecast unavailable, continuing with current conditions only");
                Vec::new()
            }
        };

        debug!(
            condition = %current.condition,
            wind = %current.format_wind(),
            "Parsed current weather"
        );
        info!(
            forecast_points = forecast.len(),
            "Retrieved weather in {:.3}s",
            start_time.elapsed().as_secs_f64()
        );

        Ok(WeatherObservation {
            current,
            location_name,
            forecast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> OpenWeatherClient {
        let config = WeatherConfig {
            api_key: api_key.map(str::to_string),
            base_url: server.uri(),
            timeout_seconds: 2,
            ..WeatherConfig::default()
        };
        OpenWeatherClient::new(&config).unwrap()
    }

    fn current_body() -> serde_json::Value {
        serde_json::json!({
            "weather": [{"id": 500, "main": "Rain", "description": "light rain"}],
            "main": {"temp": 21.4, "feels_like": 21.0, "humidity": 64, "pressure": 1012},
            "visibility": 8000,
            "wind": {"speed": 6.2, "deg": 200},
            "name": "New York",
            "cod": 200
        })
    }

    fn forecast_body() -> serde_json::Value {
        let item = |dt: i64, temp: f64| {
            serde_json::json!({
                "dt": dt,
                "main": {"temp": temp, "feels_like": temp, "humidity": 60, "pressure": 1010},
                "weather": [{"description": "scattered clouds"}],
                "wind": {"speed": 4.0},
                "rain": {"3h": 0.4},
                "snow": {"3h": 0.1}
            })
        };
        serde_json::json!({
            "cod": "200",
            "list": [
                item(1748782800, 20.0),
                item(1748793600, 19.0),
                item(1748804400, 18.0),
                item(1748815200, 17.0),
                item(1748826000, 16.0)
            ]
        })
    }

    #[tokio::test]
    async fn test_fetch_weather_parses_current_and_forecast() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("units", "metric"))
            .and(query_param("appid", "owm-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .and(query_param("cnt", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .expect(1)
            .mount(&server)
            .await;

        let coordinate = Coordinate::new(40.713, -74.006).unwrap();
        let observation = client_for(&server, Some("owm-key"))
            .fetch_weather(&coordinate)
            .await
            .unwrap();

        assert_eq!(observation.current.condition, "Light Rain");
        assert_eq!(observation.current.visibility, Some(8.0));
        assert_eq!(observation.current.wind_direction, Some(200));
        assert_eq!(observation.current.humidity, 64);
        assert_eq!(observation.location_name.as_deref(), Some("New York"));
        assert_eq!(observation.forecast.len(), 4);
        assert!((observation.forecast[0].precipitation - 0.5).abs() < 1e-9);
        assert_eq!(observation.forecast[0].condition, "Scattered Clouds");
    }

    #[tokio::test]
    async fn test_missing_visibility_and_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "weather": [],
                "main": {"temp": 12.0, "feels_like": 10.5, "humidity": 80, "pressure": 1003},
                "wind": {"speed": 3.0}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(&server)
            .await;

        let coordinate = Coordinate::new(51.5, -0.12).unwrap();
        let observation = client_for(&server, Some("owm-key"))
            .fetch_weather(&coordinate)
            .await
            .unwrap();

        assert_eq!(observation.current.condition, "Unknown");
        assert_eq!(observation.current.visibility, None);
        assert_eq!(observation.current.wind_direction, None);
        assert_eq!(observation.location_name, None);
    }

    #[tokio::test]
    async fn test_forecast_failure_keeps_current_conditions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let coordinate = Coordinate::new(40.713, -74.006).unwrap();
        let observation = client_for(&server, Some("owm-key"))
            .fetch_weather(&coordinate)
            .await
            .unwrap();

        assert!(observation.forecast.is_empty());
        assert_eq!(observation.current.temperature, 21.4);
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "cod": 401,
                "message": "Invalid API key. Please see https://openweathermap.org/faq#error401 for more info."
            })))
            .mount(&server)
            .await;

        let coordinate = Coordinate::new(40.713, -74.006).unwrap();
        let err = client_for(&server, Some("bad"))
            .fetch_weather(&coordinate)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TideCastError::UpstreamRejected {
                service: Service::WeatherApi,
                status: 401,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_required_field_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "main": {"temp": 12.0},
                "wind": {"speed": 3.0}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
            .mount(&server)
            .await;

        let coordinate = Coordinate::new(40.713, -74.006).unwrap();
        let err = client_for(&server, Some("owm-key"))
            .fetch_weather(&coordinate)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_describe_title_cases() {
        let conditions = vec![Condition {
            description: Some("overcast clouds".to_string()),
        }];
        assert_eq!(describe(&conditions), "Overcast Clouds");
        assert_eq!(describe(&[]), "Unknown");
    }
}
