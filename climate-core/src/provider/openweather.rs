use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};
use tracing::info;

use crate::{
    error::FetchError,
    model::{AirQualityReading, Coordinates, Pollutant, WeatherReading},
    provider::{get_json, unix_to_utc},
};

use super::{AirQualitySource, WeatherSource};

const PROVIDER: &str = "openweather";
const BASE_URL: &str = "https://api.openweathermap.org";

/// OpenWeatherMap client serving both air pollution and current weather.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        Self {
            api_key,
            http: Client::new(),
            base_url: BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn query(&self, coordinates: Coordinates) -> Vec<(&'static str, String)> {
        vec![
            ("lat", coordinates.latitude.to_string()),
            ("lon", coordinates.longitude.to_string()),
            ("appid", self.api_key.clone()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct OwAirMain {
    aqi: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OwAirEntry {
    dt: Option<i64>,
    main: Option<OwAirMain>,
    components: Option<HashMap<String, Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct OwAirResponse {
    #[serde(default)]
    list: Vec<OwAirEntry>,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<u8>,
    pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    dt: Option<i64>,
    main: Option<OwMain>,
    #[serde(default)]
    weather: Vec<OwWeather>,
    wind: Option<OwWind>,
}

fn missing(field: &'static str) -> FetchError {
    FetchError::MissingField {
        provider: PROVIDER,
        field,
    }
}

#[async_trait]
impl AirQualitySource for OpenWeatherProvider {
    async fn fetch_air_quality(&self, coordinates: Coordinates) -> Result<AirQualityReading, FetchError> {
        let url = format!("{}/data/2.5/air_pollution", self.base_url);
        let parsed: OwAirResponse =
            get_json(&self.http, PROVIDER, &url, &self.query(coordinates), self.timeout).await?;

        let entry = parsed.list.into_iter().next().ok_or_else(|| missing("list[0]"))?;
        let aqi = entry
            .main
            .and_then(|m| m.aqi)
            .ok_or_else(|| missing("list[0].main.aqi"))?;
        let components = entry.components.ok_or_else(|| missing("list[0].components"))?;

        let pollutants = components
            .into_iter()
            .filter_map(|(key, value)| Some((Pollutant::from_key(&key)?, value?)))
            .collect();

        let reading = AirQualityReading {
            provider: PROVIDER.to_string(),
            aqi,
            pollutants,
            observation_time: entry.dt.and_then(unix_to_utc).unwrap_or_else(Utc::now),
        };
        info!(
            aqi = reading.aqi,
            pm2_5 = ?reading.concentration(Pollutant::Pm2_5),
            o3 = ?reading.concentration(Pollutant::O3),
            "OpenWeather air quality received"
        );
        Ok(reading)
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherProvider {
    async fn fetch_weather(&self, coordinates: Coordinates) -> Result<WeatherReading, FetchError> {
        let url = format!("{}/data/2.5/weather", self.base_url);
        let mut query = self.query(coordinates);
        query.push(("units", "metric".to_string()));

        let parsed: OwCurrentResponse =
            get_json(&self.http, PROVIDER, &url, &query, self.timeout).await?;

        let main = parsed.main.ok_or_else(|| missing("main"))?;
        let description = parsed
            .weather
            .into_iter()
            .next()
            .map(|w| w.description)
            .ok_or_else(|| missing("weather[0].description"))?;

        let reading = WeatherReading {
            provider: PROVIDER.to_string(),
            temperature_c: main.temp.ok_or_else(|| missing("main.temp"))?,
            feels_like_c: main.feels_like,
            humidity_pct: main.humidity.ok_or_else(|| missing("main.humidity"))?,
            pressure_hpa: main.pressure,
            wind_speed_mps: parsed
                .wind
                .and_then(|w| w.speed)
                .ok_or_else(|| missing("wind.speed"))?,
            description,
            observation_time: parsed.dt.and_then(unix_to_utc).unwrap_or_else(Utc::now),
        };
        info!(
            temperature_c = reading.temperature_c,
            description = %reading.description,
            "OpenWeather current weather received"
        );
        Ok(reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;
    use serde_json::json;

    const COORDS: Coordinates = Coordinates {
        latitude: 39.78,
        longitude: -89.65,
    };

    fn provider(server: &mockito::ServerGuard) -> OpenWeatherProvider {
        OpenWeatherProvider::new("TEST_KEY".into(), Duration::from_secs(5)).with_base_url(&server.url())
    }

    fn coordinate_query() -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("lat".into(), "39.78".into()),
            Matcher::UrlEncoded("lon".into(), "-89.65".into()),
            Matcher::UrlEncoded("appid".into(), "TEST_KEY".into()),
        ])
    }

    #[tokio::test]
    async fn parses_air_pollution_response() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "coord": { "lon": -89.65, "lat": 39.78 },
            "list": [{
                "main": { "aqi": 2 },
                "components": {
                    "co": 201.94, "no": 0.02, "no2": 0.77, "o3": 68.66,
                    "so2": 0.64, "pm2_5": 0.5, "pm10": 0.54, "nh3": 0.12
                },
                "dt": 1_605_182_400
            }]
        });
        let mock = server
            .mock("GET", "/data/2.5/air_pollution")
            .match_query(coordinate_query())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let reading = provider(&server).fetch_air_quality(COORDS).await.expect("fetch should succeed");

        mock.assert_async().await;
        assert_eq!(reading.aqi, 2);
        assert_eq!(reading.concentration(Pollutant::Pm2_5), Some(0.5));
        assert_eq!(reading.concentration(Pollutant::O3), Some(68.66));
        assert_eq!(reading.pollutants.len(), 6, "no and nh3 are not recorded");
        assert_eq!(reading.observation_time, Utc.timestamp_opt(1_605_182_400, 0).unwrap());
    }

    #[tokio::test]
    async fn missing_aqi_is_a_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/2.5/air_pollution")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({ "list": [{ "main": {}, "components": {} }] }).to_string())
            .create_async()
            .await;

        let err = provider(&server).fetch_air_quality(COORDS).await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::MissingField {
                field: "list[0].main.aqi",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_list_is_a_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/2.5/air_pollution")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"list":[]}"#)
            .create_async()
            .await;

        let err = provider(&server).fetch_air_quality(COORDS).await.unwrap_err();
        assert!(matches!(err, FetchError::MissingField { field: "list[0]", .. }));
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/2.5/air_pollution")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"cod":401,"message":"Invalid API key"}"#)
            .create_async()
            .await;

        let err = provider(&server).fetch_air_quality(COORDS).await.unwrap_err();
        match err {
            FetchError::Status { status, body, .. } => {
                assert_eq!(status.as_u16(), 401);
                assert!(body.contains("Invalid API key"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_a_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data/2.5/air_pollution")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let err = provider(&server).fetch_air_quality(COORDS).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[tokio::test]
    async fn parses_current_weather_in_metric_units() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "weather": [{ "id": 800, "main": "Clear", "description": "clear sky" }],
            "main": { "temp": 32.4, "feels_like": 34.1, "pressure": 1012, "humidity": 40 },
            "wind": { "speed": 3.6, "deg": 200 },
            "dt": 1_700_000_000,
            "name": "Springfield"
        });
        let mock = server
            .mock("GET", "/data/2.5/weather")
            .match_query(Matcher::AllOf(vec![
                coordinate_query(),
                Matcher::UrlEncoded("units".into(), "metric".into()),
            ]))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let reading = provider(&server).fetch_weather(COORDS).await.expect("fetch should succeed");

        mock.assert_async().await;
        assert_eq!(reading.temperature_c, 32.4);
        assert_eq!(reading.feels_like_c, Some(34.1));
        assert_eq!(reading.humidity_pct, 40);
        assert_eq!(reading.pressure_hpa, Some(1012.0));
        assert_eq!(reading.wind_speed_mps, 3.6);
        assert_eq!(reading.description, "clear sky");
    }

    #[tokio::test]
    async fn weather_without_wind_is_a_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "weather": [{ "description": "mist" }],
            "main": { "temp": 12.0, "humidity": 90 }
        });
        let _mock = server
            .mock("GET", "/data/2.5/weather")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let err = provider(&server).fetch_weather(COORDS).await.unwrap_err();
        assert!(matches!(err, FetchError::MissingField { field: "wind.speed", .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_request_error() {
        let provider = OpenWeatherProvider::new("TEST_KEY".into(), Duration::from_secs(1))
            .with_base_url("http://127.0.0.1:1");

        let err = provider.fetch_weather(COORDS).await.unwrap_err();
        assert!(matches!(err, FetchError::Request { provider: "openweather", .. }));
    }

    #[tokio::test]
    async fn request_error_does_not_leak_api_key() {
        let provider = OpenWeatherProvider::new("TEST_KEY".into(), Duration::from_secs(1))
            .with_base_url("http://127.0.0.1:1");

        let err = provider.fetch_air_quality(COORDS).await.unwrap_err();

        let mut rendered = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            rendered.push_str(&format!("\n{cause}"));
            source = cause.source();
        }
        assert!(!rendered.contains("TEST_KEY"), "rendered error: {rendered}");
        assert!(!rendered.contains("appid="), "rendered error: {rendered}");
    }
}
