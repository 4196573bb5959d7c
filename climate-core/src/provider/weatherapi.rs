use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::{collections::BTreeMap, time::Duration};
use tracing::info;

use crate::{
    error::FetchError,
    model::{AirQualityReading, Coordinates, Pollutant, WeatherReading},
    provider::{get_json, unix_to_utc},
};

use super::{AirQualitySource, WeatherSource};

const PROVIDER: &str = "weatherapi";
const BASE_URL: &str = "https://api.weatherapi.com";

/// WeatherAPI.com client. Both readings come from `current.json`; air
/// quality is requested with `aqi=yes` and reported on the US-EPA 1-6 index.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    http: Client,
    base_url: String,
    timeout: Duration,
}

impl WeatherApiProvider {
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

    async fn fetch_current(&self, coordinates: Coordinates, with_aqi: bool) -> Result<WaCurrent, FetchError> {
        let url = format!("{}/v1/current.json", self.base_url);
        let query = [
            ("key", self.api_key.clone()),
            ("q", format!("{},{}", coordinates.latitude, coordinates.longitude)),
            ("aqi", if with_aqi { "yes" } else { "no" }.to_string()),
        ];

        let parsed: WaResponse = get_json(&self.http, PROVIDER, &url, &query, self.timeout).await?;
        parsed.current.ok_or_else(|| missing("current"))
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaAirQuality {
    co: Option<f64>,
    no2: Option<f64>,
    o3: Option<f64>,
    so2: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    #[serde(rename = "us-epa-index")]
    us_epa_index: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    last_updated_epoch: Option<i64>,
    temp_c: Option<f64>,
    feelslike_c: Option<f64>,
    humidity: Option<u8>,
    pressure_mb: Option<f64>,
    wind_kph: Option<f64>,
    condition: Option<WaCondition>,
    air_quality: Option<WaAirQuality>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: Option<WaCurrent>,
}

fn missing(field: &'static str) -> FetchError {
    FetchError::MissingField {
        provider: PROVIDER,
        field,
    }
}

#[async_trait]
impl AirQualitySource for WeatherApiProvider {
    async fn fetch_air_quality(&self, coordinates: Coordinates) -> Result<AirQualityReading, FetchError> {
        let current = self.fetch_current(coordinates, true).await?;
        let air = current.air_quality.ok_or_else(|| missing("current.air_quality"))?;
        let aqi = air
            .us_epa_index
            .ok_or_else(|| missing("current.air_quality.us-epa-index"))?;

        let pollutants: BTreeMap<Pollutant, f64> = [
            (Pollutant::Pm2_5, air.pm2_5),
            (Pollutant::Pm10, air.pm10),
            (Pollutant::O3, air.o3),
            (Pollutant::No2, air.no2),
            (Pollutant::So2, air.so2),
            (Pollutant::Co, air.co),
        ]
        .into_iter()
        .filter_map(|(p, v)| Some((p, v?)))
        .collect();

        let reading = AirQualityReading {
            provider: PROVIDER.to_string(),
            aqi,
            pollutants,
            observation_time: current
                .last_updated_epoch
                .and_then(unix_to_utc)
                .unwrap_or_else(Utc::now),
        };
        info!(aqi = reading.aqi, "WeatherAPI air quality received");
        Ok(reading)
    }
}

#[async_trait]
impl WeatherSource for WeatherApiProvider {
    async fn fetch_weather(&self, coordinates: Coordinates) -> Result<WeatherReading, FetchError> {
        let current = self.fetch_current(coordinates, false).await?;

        let wind_kph = current.wind_kph.ok_or_else(|| missing("current.wind_kph"))?;
        let reading = WeatherReading {
            provider: PROVIDER.to_string(),
            temperature_c: current.temp_c.ok_or_else(|| missing("current.temp_c"))?,
            feels_like_c: current.feelslike_c,
            humidity_pct: current.humidity.ok_or_else(|| missing("current.humidity"))?,
            pressure_hpa: current.pressure_mb,
            wind_speed_mps: wind_kph / 3.6,
            description: current
                .condition
                .map(|c| c.text)
                .ok_or_else(|| missing("current.condition.text"))?,
            observation_time: current
                .last_updated_epoch
                .and_then(unix_to_utc)
                .unwrap_or_else(Utc::now),
        };
        info!(
            temperature_c = reading.temperature_c,
            description = %reading.description,
            "WeatherAPI current weather received"
        );
        Ok(reading)
    }
}
