use std::{
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use climate_core::{Config, ConfigError, Location, LogRow, ProviderId, ReadingStore, Thresholds, run_once};
use inquire::{Password, Select, Text};
use tracing::{error, warn};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "climate",
    version,
    about = "Fetch, log and check local air quality and weather"
)]
pub struct Cli {
    /// Config file to use instead of the one in the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print debug logs to stderr (RUST_LOG overrides this).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, store, evaluate and report once.
    Run,

    /// Interactively create or update the config file.
    Configure,

    /// Show the resolved configuration with API keys masked.
    ShowConfig,

    /// Show the newest rows of the reading log.
    History {
        /// Number of rows to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => Config::default_path()?,
        };

        match self.command {
            Command::Run => {
                let mut stdout = io::stdout().lock();
                if let Err(e) = run_once(&path, &mut stdout).await {
                    error!(stage = %e.stage(), "pipeline aborted");
                    return Err(e.into());
                }
            }
            Command::Configure => configure(&path)?,
            Command::ShowConfig => show_config(&path)?,
            Command::History { limit } => history(&path, limit)?,
        }

        Ok(())
    }
}

/// The config file as written, for prompt defaults. Keys that only live in
/// the environment stay out of it, so `configure` never writes them to disk.
fn existing_config(path: &Path) -> Option<Config> {
    match Config::load_unresolved(path) {
        Ok(cfg) => Some(cfg),
        Err(ConfigError::NotFound { .. }) => None,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable config file, starting from scratch");
            None
        }
    }
}

fn configure(path: &Path) -> Result<()> {
    let existing = existing_config(path);
    let current = existing.as_ref();

    let city_default = current.map(|c| c.location.city_name.clone()).unwrap_or_default();
    let lat_default = current.map(|c| c.location.latitude.to_string()).unwrap_or_default();
    let lon_default = current.map(|c| c.location.longitude.to_string()).unwrap_or_default();
    let aqi_default = current
        .and_then(|c| c.thresholds.aqi_alert)
        .map(|t| t.to_string())
        .unwrap_or_default();
    let temp_default = current
        .and_then(|c| c.thresholds.temp_alert_celsius)
        .map(|t| t.to_string())
        .unwrap_or_default();
    let log_default = current
        .map(|c| c.storage.csv_filename.display().to_string())
        .unwrap_or_else(|| "climate_data_log.csv".to_string());

    let city_name = Text::new("City name:").with_default(&city_default).prompt()?;
    let latitude = Text::new("Latitude:").with_default(&lat_default).prompt()?;
    let longitude = Text::new("Longitude:").with_default(&lon_default).prompt()?;

    let provider = Select::new("Data provider:", ProviderId::all().to_vec()).prompt()?;
    let api_key = Password::new(&format!("API key for {provider}:"))
        .without_confirmation()
        .prompt()?;

    let aqi_alert = Text::new("AQI alert threshold:")
        .with_default(&aqi_default)
        .with_help_message("alert when AQI is strictly above this; leave empty to disable")
        .prompt()?;
    let temp_alert = Text::new("Temperature alert threshold (°C):")
        .with_default(&temp_default)
        .with_help_message("alert when temperature is strictly above this; leave empty to disable")
        .prompt()?;
    let csv_filename = Text::new("Reading log path:").with_default(&log_default).prompt()?;

    let mut cfg = Config::new(
        Location {
            city_name: city_name.trim().to_string(),
            latitude: latitude.trim().parse::<f64>().context("Latitude must be a number")?,
            longitude: longitude.trim().parse::<f64>().context("Longitude must be a number")?,
        },
        Thresholds {
            aqi_alert: parse_optional::<u32>(&aqi_alert).context("AQI threshold must be a whole number")?,
            temp_alert_celsius: parse_optional::<f64>(&temp_alert)
                .context("Temperature threshold must be a number")?,
        },
    );
    if let Some(prev) = current {
        cfg.providers = prev.providers.clone();
        cfg.sources.timeout_seconds = prev.sources.timeout_seconds;
    }
    cfg.storage.csv_filename = PathBuf::from(csv_filename.trim());
    cfg.upsert_provider_api_key(provider, api_key.trim().to_string());

    cfg.validate()?;
    cfg.save(path)?;

    println!("Saved configuration to {}", path.display());
    Ok(())
}

fn parse_optional<T: std::str::FromStr>(input: &str) -> Result<Option<T>, T::Err> {
    let input = input.trim();
    if input.is_empty() {
        Ok(None)
    } else {
        input.parse().map(Some)
    }
}

fn show_config(path: &Path) -> Result<()> {
    let cfg = Config::load(path)?;
    let loc = &cfg.location;

    println!("Config file:   {}", path.display());
    println!("Location:      {} {}", loc.city_name, loc.coordinates());
    println!("AQI alert:     {}", limit(cfg.thresholds.aqi_alert, ""));
    println!("Temp alert:    {}", limit(cfg.thresholds.temp_alert_celsius, " °C"));
    println!("Reading log:   {}", cfg.storage.csv_filename.display());
    println!("Air quality:   {}", cfg.sources.air_quality);
    println!("Weather:       {}", cfg.sources.weather);
    println!("Timeout:       {}s", cfg.sources.timeout_seconds);

    for id in cfg.selected_providers()? {
        if let Some(key) = cfg.provider_api_key(id) {
            println!("API key:       {id} = {}", mask(key));
        }
    }
    Ok(())
}

fn limit<T: std::fmt::Display>(value: Option<T>, unit: &str) -> String {
    value.map_or_else(|| "not set".to_string(), |v| format!("> {v}{unit}"))
}

fn mask(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{visible}****")
}

fn history(path: &Path, limit: usize) -> Result<()> {
    let cfg = Config::load(path)?;
    let store = ReadingStore::from_config(&cfg);
    let rows = store.tail(limit)?;

    if rows.is_empty() {
        println!(
            "No readings logged yet in {}. Run `climate run` to create it.",
            store.path().display()
        );
        return Ok(());
    }

    println!(
        "{:<20}  {:>4}  {:>7}  {:>7}  {:>7}  {:>4}  {:>6}  description",
        "timestamp (UTC)", "aqi", "pm2_5", "o3", "temp °C", "hum%", "wind"
    );
    for row in &rows {
        println!("{}", format_row(row));
    }
    println!(
        "Displaying latest {} entries from {} (as of {})",
        rows.len(),
        store.path().display(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

fn format_row(row: &LogRow) -> String {
    let opt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
    format!(
        "{:<20}  {:>4}  {:>7}  {:>7}  {:>7.1}  {:>4}  {:>6.1}  {}",
        row.timestamp.format("%Y-%m-%d %H:%M:%S"),
        row.aqi,
        opt(row.pm2_5),
        opt(row.o3),
        row.temperature_celsius,
        row.humidity_percent,
        row.wind_speed_mps,
        row.description,
    )
}
