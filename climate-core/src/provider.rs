use crate::{
    Config,
    error::{ConfigError, FetchError},
    model::{AirQualityReading, Coordinates, WeatherReading},
    provider::{openweather::OpenWeatherProvider, weatherapi::WeatherApiProvider},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::{fmt::Debug, time::Duration};
use tracing::debug;

pub mod openweather;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeather,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "openweather",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    /// Environment variable consulted when the config file has no key.
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            ProviderId::OpenWeather => "OPENWEATHERMAP_API_KEY",
            ProviderId::WeatherApi => "WEATHERAPI_API_KEY",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::OpenWeather, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweather" => Ok(ProviderId::OpenWeather),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(ConfigError::UnknownProvider(value.to_string())),
        }
    }
}

/// Current air quality for a coordinate. One outbound request, no retries.
#[async_trait]
pub trait AirQualitySource: Send + Sync + Debug {
    async fn fetch_air_quality(&self, coordinates: Coordinates) -> Result<AirQualityReading, FetchError>;
}

/// Current weather for a coordinate. One outbound request, no retries.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch_weather(&self, coordinates: Coordinates) -> Result<WeatherReading, FetchError>;
}

/// Build the air-quality source selected by `[sources] air_quality`.
pub fn air_quality_source_from_config(config: &Config) -> Result<Box<dyn AirQualitySource>, ConfigError> {
    let id = config.air_quality_provider_id()?;
    let boxed: Box<dyn AirQualitySource> = match id {
        ProviderId::OpenWeather => Box::new(openweather_from_config(config)?),
        ProviderId::WeatherApi => Box::new(weatherapi_from_config(config)?),
    };
    Ok(boxed)
}

/// Build the weather source selected by `[sources] weather`.
pub fn weather_source_from_config(config: &Config) -> Result<Box<dyn WeatherSource>, ConfigError> {
    let id = config.weather_provider_id()?;
    let boxed: Box<dyn WeatherSource> = match id {
        ProviderId::OpenWeather => Box::new(openweather_from_config(config)?),
        ProviderId::WeatherApi => Box::new(weatherapi_from_config(config)?),
    };
    Ok(boxed)
}

fn openweather_from_config(config: &Config) -> Result<OpenWeatherProvider, ConfigError> {
    let id = ProviderId::OpenWeather;
    let provider = OpenWeatherProvider::new(api_key(config, id)?.to_owned(), config.request_timeout());
    Ok(match base_url(config, id) {
        Some(url) => provider.with_base_url(url),
        None => provider,
    })
}

fn weatherapi_from_config(config: &Config) -> Result<WeatherApiProvider, ConfigError> {
    let id = ProviderId::WeatherApi;
    let provider = WeatherApiProvider::new(api_key(config, id)?.to_owned(), config.request_timeout());
    Ok(match base_url(config, id) {
        Some(url) => provider.with_base_url(url),
        None => provider,
    })
}

fn api_key(config: &Config, id: ProviderId) -> Result<&str, ConfigError> {
    config
        .provider_api_key(id)
        .ok_or(ConfigError::MissingApiKey {
            provider: id.as_str(),
            env_var: id.api_key_env_var(),
        })
}

fn base_url(config: &Config, id: ProviderId) -> Option<&str> {
    config.provider_config(id).and_then(|cfg| cfg.base_url.as_deref())
}

/// Issue one GET and decode a successful JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    http: &Client,
    provider: &'static str,
    url: &str,
    query: &[(&str, String)],
    timeout: Duration,
) -> Result<T, FetchError> {
    debug!(provider, url, "sending request");

    let res = http
        .get(url)
        .query(query)
        .timeout(timeout)
        .send()
        .await
        .map_err(|source| request_error(provider, source))?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|source| request_error(provider, source))?;

    if !status.is_success() {
        return Err(FetchError::Status {
            provider,
            status,
            body: truncate_body(&body),
        });
    }

    serde_json::from_str(&body).map_err(|source| FetchError::Parse { provider, source })
}

// The query string carries the API key, so the URL never goes into the error.
fn request_error(provider: &'static str, source: reqwest::Error) -> FetchError {
    FetchError::Request {
        provider,
        source: source.without_url(),
    }
}

pub(crate) fn unix_to_utc(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
