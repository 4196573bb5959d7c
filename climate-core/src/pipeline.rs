//! One run: load config, fetch both readings, store, evaluate, report.
//!
//! Every stage failure aborts the rest of the run. Nothing is written to the
//! reading log unless both fetches succeed.

use std::{fmt::Display, io::Write, path::Path};

use tracing::{error, info};

use crate::{
    Config,
    error::{ConfigError, PipelineError},
    evaluate::evaluate,
    model::{CombinedRecord, EvaluationResult, Pollutant},
    provider::{AirQualitySource, WeatherSource, air_quality_source_from_config, weather_source_from_config},
    report::report,
    store::ReadingStore,
};

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub record: CombinedRecord,
    pub evaluation: EvaluationResult,
}

#[derive(Debug)]
pub struct Pipeline {
    air_quality: Box<dyn AirQualitySource>,
    weather: Box<dyn WeatherSource>,
    store: ReadingStore,
}

impl Pipeline {
    pub fn new(
        air_quality: Box<dyn AirQualitySource>,
        weather: Box<dyn WeatherSource>,
        store: ReadingStore,
    ) -> Self {
        Self {
            air_quality,
            weather,
            store,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(
            air_quality_source_from_config(config)?,
            weather_source_from_config(config)?,
            ReadingStore::from_config(config),
        ))
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    /// Run every stage after configuration, writing one status line per stage
    /// and the final report to `out`.
    pub async fn run<W: Write>(&self, config: &Config, out: &mut W) -> Result<RunOutcome, PipelineError> {
        let location = &config.location;
        let coordinates = location.coordinates();

        status(
            out,
            "fetch",
            format_args!("Fetching air quality and weather for {} {coordinates}", location.city_name),
        )?;

        let (air_quality, weather) = tokio::try_join!(
            self.air_quality.fetch_air_quality(coordinates),
            self.weather.fetch_weather(coordinates),
        )
        .inspect_err(|e| error!(error = %e, "fetch failed, nothing stored"))?;

        status(
            out,
            "air-quality",
            format_args!(
                "AQI {} via {} (pm2_5: {}, o3: {})",
                air_quality.aqi,
                air_quality.provider,
                show(air_quality.concentration(Pollutant::Pm2_5)),
                show(air_quality.concentration(Pollutant::O3)),
            ),
        )?;
        status(
            out,
            "weather",
            format_args!(
                "{}°C, {}% humidity, wind {} m/s, {} via {}",
                weather.temperature_c,
                weather.humidity_pct,
                weather.wind_speed_mps,
                weather.description,
                weather.provider,
            ),
        )?;

        let record = CombinedRecord::new(location, air_quality, weather);
        self.store.append(&record)?;
        status(
            out,
            "storage",
            format_args!("Appended reading to {}", self.store.path().display()),
        )?;

        let evaluation = evaluate(&record, config);
        info!(alert = evaluation.alert, "analysis complete");
        status(out, "evaluate", format_args!("Alert needed: {}", evaluation.alert))?;

        report(&evaluation, out).map_err(PipelineError::Report)?;

        Ok(RunOutcome { record, evaluation })
    }
}

/// Load the configuration at `config_path`, then run the pipeline once.
/// A configuration error aborts before any network call.
pub async fn run_once<W: Write>(config_path: &Path, out: &mut W) -> Result<RunOutcome, PipelineError> {
    let config = Config::load(config_path)?;
    status(
        out,
        "config",
        format_args!(
            "Loaded configuration for {} {}",
            config.location.city_name,
            config.location.coordinates()
        ),
    )?;

    let pipeline = Pipeline::from_config(&config)?;
    pipeline.run(&config, out).await
}

fn status<W: Write>(out: &mut W, stage: &str, message: impl Display) -> Result<(), PipelineError> {
    writeln!(out, "[{stage}] {message}").map_err(PipelineError::Report)
}

fn show(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Location, Thresholds},
        error::{FetchError, Stage, StorageError},
        model::{AirQualityReading, Coordinates, WeatherReading},
        provider::ProviderId,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use mockito::Matcher;
    use serde_json::json;
    use std::{collections::BTreeMap, fs};

    #[derive(Debug)]
    struct FakeAir(Option<u32>);

    #[async_trait]
    impl AirQualitySource for FakeAir {
        async fn fetch_air_quality(&self, _: Coordinates) -> Result<AirQualityReading, FetchError> {
            let aqi = self.0.ok_or(FetchError::MissingField {
                provider: "fake",
                field: "aqi",
            })?;
            Ok(AirQualityReading {
                provider: "fake".into(),
                aqi,
                pollutants: BTreeMap::from([(Pollutant::Pm2_5, 35.0)]),
                observation_time: Utc::now(),
            })
        }
    }

    #[derive(Debug)]
    struct FakeWeather(Option<f64>);

    #[async_trait]
    impl WeatherSource for FakeWeather {
        async fn fetch_weather(&self, _: Coordinates) -> Result<WeatherReading, FetchError> {
            let temperature_c = self.0.ok_or(FetchError::MissingField {
                provider: "fake",
                field: "temp",
            })?;
            Ok(WeatherReading {
                provider: "fake".into(),
                temperature_c,
                feels_like_c: None,
                humidity_pct: 30,
                pressure_hpa: None,
                wind_speed_mps: 4.0,
                description: "clear sky".into(),
                observation_time: Utc::now(),
            })
        }
    }

    fn config() -> Config {
        Config::new(
            Location {
                city_name: "Springfield".into(),
                latitude: 39.78,
                longitude: -89.65,
            },
            Thresholds {
                aqi_alert: Some(100),
                temp_alert_celsius: Some(30.0),
            },
        )
    }

    fn pipeline(air: Option<u32>, temp: Option<f64>, log: &Path) -> Pipeline {
        Pipeline::new(
            Box::new(FakeAir(air)),
            Box::new(FakeWeather(temp)),
            ReadingStore::new(log),
        )
    }

    #[tokio::test]
    async fn successful_run_stores_evaluates_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("climate.csv");
        let mut out = Vec::new();

        let outcome = pipeline(Some(110), Some(32.0), &log)
            .run(&config(), &mut out)
            .await
            .expect("run should succeed");

        assert!(outcome.evaluation.alert);
        assert_eq!(outcome.record.location_name, "Springfield");
        assert_eq!(fs::read_to_string(&log).unwrap().lines().count(), 2);

        let text = String::from_utf8(out).unwrap();
        for stage in ["[fetch]", "[air-quality]", "[weather]", "[storage]", "[evaluate]", "[ALERT]"] {
            assert!(text.contains(stage), "missing {stage} in:\n{text}");
        }
    }

    #[tokio::test]
    async fn each_run_appends_exactly_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("climate.csv");
        let cfg = config();

        for _ in 0..3 {
            pipeline(Some(20), Some(10.0), &log)
                .run(&cfg, &mut Vec::new())
                .await
                .unwrap();
        }

        assert_eq!(ReadingStore::new(&log).tail(usize::MAX).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn air_quality_failure_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("climate.csv");
        let mut out = Vec::new();

        let err = pipeline(None, Some(32.0), &log)
            .run(&config(), &mut out)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Fetch);
        assert!(!log.exists());
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("[storage]"));
    }

    #[tokio::test]
    async fn weather_failure_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("climate.csv");

        let err = pipeline(Some(110), None, &log)
            .run(&config(), &mut Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Fetch(FetchError::MissingField { field: "temp", .. })));
        assert!(!log.exists());
    }

    #[tokio::test]
    async fn storage_failure_skips_evaluation_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("climate.csv");
        fs::write(&log, "when,what\n").unwrap();
        let mut out = Vec::new();

        let err = pipeline(Some(110), Some(32.0), &log)
            .run(&config(), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Storage(StorageError::HeaderMismatch { .. })));
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("[evaluate]"));
        assert!(!text.contains("[ALERT]") && !text.contains("[OK]"));
    }

    fn write_config(dir: &Path, server_url: &str) -> std::path::PathBuf {
        let mut cfg = config();
        cfg.upsert_provider_api_key(ProviderId::OpenWeather, "TEST_KEY".into());
        if let Some(provider) = cfg.providers.get_mut("openweather") {
            provider.base_url = Some(server_url.to_string());
        }
        cfg.storage.csv_filename = dir.join("climate.csv");

        let path = dir.join("config.toml");
        cfg.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn run_once_against_http_sources() {
        let mut server = mockito::Server::new_async().await;
        let _air = server
            .mock("GET", "/data/2.5/air_pollution")
            .match_query(Matcher::UrlEncoded("appid".into(), "TEST_KEY".into()))
            .with_status(200)
            .with_body(
                json!({ "list": [{ "main": { "aqi": 4 }, "components": { "pm2_5": 60.1, "o3": 140.0 } }] })
                    .to_string(),
            )
            .create_async()
            .await;
        let _weather = server
            .mock("GET", "/data/2.5/weather")
            .match_query(Matcher::UrlEncoded("units".into(), "metric".into()))
            .with_status(200)
            .with_body(
                json!({
                    "weather": [{ "description": "haze" }],
                    "main": { "temp": 31.2, "humidity": 35 },
                    "wind": { "speed": 1.5 }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), &server.url());
        let mut out = Vec::new();

        let outcome = run_once(&config_path, &mut out).await.expect("run should succeed");

        assert_eq!(outcome.record.aqi(), 4);
        assert!(!outcome.evaluation.alert, "AQI 4 is under the threshold of 100");
        let rows = ReadingStore::new(dir.path().join("climate.csv")).tail(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "haze");
        assert!(String::from_utf8(out).unwrap().starts_with("[config] Loaded configuration for Springfield"));
    }

    #[tokio::test]
    async fn malformed_air_quality_response_never_reaches_storage() {
        let mut server = mockito::Server::new_async().await;
        let _air = server
            .mock("GET", "/data/2.5/air_pollution")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({ "list": [{ "components": { "pm2_5": 60.1 } }] }).to_string())
            .create_async()
            .await;
        let _weather = server
            .mock("GET", "/data/2.5/weather")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({
                    "weather": [{ "description": "haze" }],
                    "main": { "temp": 31.2, "humidity": 35 },
                    "wind": { "speed": 1.5 }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path(), &server.url());

        let err = run_once(&config_path, &mut Vec::new()).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Fetch(FetchError::MissingField {
                field: "list[0].main.aqi",
                ..
            })
        ));
        assert!(!dir.path().join("climate.csv").exists());
    }

    #[tokio::test]
    async fn missing_config_fails_in_config_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();

        let err = run_once(&dir.path().join("missing.toml"), &mut out).await.unwrap_err();

        assert_eq!(err.stage(), Stage::Config);
        assert!(out.is_empty());
    }
}
