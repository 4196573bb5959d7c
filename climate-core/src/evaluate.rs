//! Threshold evaluation. Pure: no I/O, same inputs give the same result.
//!
//! A dimension breaches only when its value is strictly greater than its
//! threshold (`>`, never `>=`). A dimension without a configured threshold
//! never breaches. An alert needs both dimensions to breach.

use crate::{
    Config,
    config::Thresholds,
    model::{CombinedRecord, EvaluationResult},
};

impl Thresholds {
    pub fn aqi_breached(&self, aqi: u32) -> bool {
        self.aqi_alert.is_some_and(|limit| aqi > limit)
    }

    pub fn temperature_breached(&self, temperature_c: f64) -> bool {
        self.temp_alert_celsius.is_some_and(|limit| temperature_c > limit)
    }
}

pub fn evaluate(record: &CombinedRecord, config: &Config) -> EvaluationResult {
    let thresholds = &config.thresholds;
    let aqi = record.aqi();
    let temp = record.temperature_c();
    let city = &record.location_name;

    let aqi_breached = thresholds.aqi_breached(aqi);
    let temperature_breached = thresholds.temperature_breached(temp);

    let aqi_limit = describe_limit(thresholds.aqi_alert.map(|t| t.to_string()), "");
    let temp_limit = describe_limit(thresholds.temp_alert_celsius.map(|t| t.to_string()), "°C");

    let message = match (aqi_breached, temperature_breached) {
        (true, true) => format!(
            "ALERT: Conditions threshold exceeded in {city}! \
             AQI: {aqi} (Threshold: {aqi_limit}), Temperature: {temp}°C (Threshold: {temp_limit})."
        ),
        (true, false) => format!(
            "INFO: Air Quality Index is {aqi} (Threshold: {aqi_limit}) in {city}, \
             but temperature ({temp}°C, Threshold: {temp_limit}) is not above threshold."
        ),
        (false, true) => format!(
            "INFO: Temperature is {temp}°C (Threshold: {temp_limit}) in {city}, \
             but AQI ({aqi}, Threshold: {aqi_limit}) is not above threshold."
        ),
        (false, false) => format!(
            "Conditions are within normal parameters in {city}: \
             AQI {aqi} (Threshold: {aqi_limit}), Temperature {temp}°C (Threshold: {temp_limit})."
        ),
    };

    EvaluationResult {
        alert: aqi_breached && temperature_breached,
        aqi_breached,
        temperature_breached,
        message,
    }
}

fn describe_limit(limit: Option<String>, unit: &str) -> String {
    match limit {
        Some(limit) => format!("> {limit}{unit}"),
        None => "not set".to_string(),
    }
}
