use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Location;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.latitude, self.longitude)
    }
}

/// Pollutants recorded in the reading log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pollutant {
    Pm2_5,
    Pm10,
    O3,
    No2,
    So2,
    Co,
}

impl Pollutant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Pm2_5 => "pm2_5",
            Pollutant::Pm10 => "pm10",
            Pollutant::O3 => "o3",
            Pollutant::No2 => "no2",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
        }
    }

    pub const fn all() -> &'static [Pollutant] {
        &[
            Pollutant::Pm2_5,
            Pollutant::Pm10,
            Pollutant::O3,
            Pollutant::No2,
            Pollutant::So2,
            Pollutant::Co,
        ]
    }

    /// Looks up a pollutant by the key both upstream APIs use.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.as_str() == key)
    }
}

impl std::fmt::Display for Pollutant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityReading {
    pub provider: String,
    /// AQI on the provider's own scale (1-5 for OpenWeather, 1-6 US-EPA for WeatherAPI).
    pub aqi: u32,
    /// Concentrations in µg/m³. Pollutants the source did not report are absent.
    pub pollutants: BTreeMap<Pollutant, f64>,
    pub observation_time: DateTime<Utc>,
}

impl AirQualityReading {
    pub fn concentration(&self, pollutant: Pollutant) -> Option<f64> {
        self.pollutants.get(&pollutant).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub provider: String,
    pub temperature_c: f64,
    pub feels_like_c: Option<f64>,
    pub humidity_pct: u8,
    pub pressure_hpa: Option<f64>,
    pub wind_speed_mps: f64,
    pub description: String,
    pub observation_time: DateTime<Utc>,
}

/// One run's merged readings; the unit appended to the reading log.
///
/// Only constructible from two successful readings, so a partial record can
/// never reach storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
    pub recorded_at: DateTime<Utc>,
    pub location_name: String,
    pub coordinates: Coordinates,
    pub air_quality: AirQualityReading,
    pub weather: WeatherReading,
}

impl CombinedRecord {
    pub fn new(location: &Location, air_quality: AirQualityReading, weather: WeatherReading) -> Self {
        Self {
            recorded_at: Utc::now(),
            location_name: location.city_name.clone(),
            coordinates: location.coordinates(),
            air_quality,
            weather,
        }
    }

    pub fn aqi(&self) -> u32 {
        self.air_quality.aqi
    }

    pub fn temperature_c(&self) -> f64 {
        self.weather.temperature_c
    }
}

/// Outcome of comparing one record against the configured thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub alert: bool,
    pub aqi_breached: bool,
    pub temperature_breached: bool,
    pub message: String,
}
