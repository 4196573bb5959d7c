use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::{error::ConfigError, model::Coordinates, provider::ProviderId};

/// Placeholder shipped in sample config files; treated as "no key".
const API_KEY_PLACEHOLDER: &str = "OPENWEATHERMAP_API_KEY";

/// The single location a run monitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub city_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Alert thresholds. An absent value means that dimension never breaches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqi_alert: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_alert_celsius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_csv_filename")]
    pub csv_filename: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            csv_filename: default_csv_filename(),
        }
    }
}

/// Which provider serves each reading, and how long a request may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_provider")]
    pub air_quality: String,

    #[serde(default = "default_provider")]
    pub weather: String,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            air_quality: default_provider(),
            weather: default_provider(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Configuration for a single provider (e.g., API key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,

    /// Overrides the provider's public endpoint, e.g. for a proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Top-level configuration, loaded once per run.
///
/// Example TOML:
///
/// ```toml
/// [location]
/// city_name = "Springfield"
/// latitude = 39.78
/// longitude = -89.65
///
/// [thresholds]
/// aqi_alert = 3
/// temp_alert_celsius = 30.0
///
/// [providers.openweather]
/// api_key = "..."
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub location: Location,

    pub thresholds: Thresholds,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

impl Config {
    /// A config with default storage and sources and no credentials yet.
    pub fn new(location: Location, thresholds: Thresholds) -> Self {
        Self {
            location,
            thresholds,
            storage: StorageConfig::default(),
            sources: SourcesConfig::default(),
            providers: HashMap::new(),
        }
    }

    /// Load, resolve credentials from the environment, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = Self::load_unresolved(path)?;
        cfg.resolve_credentials(|name| std::env::var(name).ok())?;
        cfg.validate()?;

        debug!(path = %path.display(), city = %cfg.location.city_name, "configuration loaded");
        Ok(cfg)
    }

    /// Read and parse the file as written: no environment lookup, no validation.
    pub fn load_unresolved(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&contents, path)
    }

    /// Parse and validate inline TOML without consulting the environment.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let cfg = Self::parse(contents, Path::new("<inline>"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let toml = toml::to_string_pretty(self)?;

        fs::write(path, toml).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Path to the config file in the platform config directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("dev", "climate-watch", "climate-watch")
            .ok_or(ConfigError::NoConfigDir)?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn air_quality_provider_id(&self) -> Result<ProviderId, ConfigError> {
        ProviderId::try_from(self.sources.air_quality.as_str())
    }

    pub fn weather_provider_id(&self) -> Result<ProviderId, ConfigError> {
        ProviderId::try_from(self.sources.weather.as_str())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.sources.timeout_seconds)
    }

    /// Fill in missing keys for the selected providers from `lookup(env_var)`.
    pub fn resolve_credentials<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        for id in self.selected_providers()? {
            if self.provider_api_key(id).is_some() {
                continue;
            }
            if let Some(key) = lookup(id.api_key_env_var()).filter(|k| !k.trim().is_empty()) {
                debug!(provider = %id, "using API key from {}", id.api_key_env_var());
                let entry = self
                    .providers
                    .entry(id.as_str().to_string())
                    .or_insert_with(|| ProviderConfig {
                        api_key: String::new(),
                        base_url: None,
                    });
                entry.api_key = key;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let loc = &self.location;

        if loc.city_name.trim().is_empty() {
            return Err(ConfigError::invalid("location.city_name must not be empty"));
        }
        if !loc.latitude.is_finite() || !(-90.0..=90.0).contains(&loc.latitude) {
            return Err(ConfigError::invalid(format!(
                "location.latitude {} is outside [-90, 90]",
                loc.latitude
            )));
        }
        if !loc.longitude.is_finite() || !(-180.0..=180.0).contains(&loc.longitude) {
            return Err(ConfigError::invalid(format!(
                "location.longitude {} is outside [-180, 180]",
                loc.longitude
            )));
        }
        if let Some(t) = self.thresholds.temp_alert_celsius.filter(|t| !t.is_finite()) {
            return Err(ConfigError::invalid(format!(
                "thresholds.temp_alert_celsius must be a finite number, got {t}"
            )));
        }
        if self.sources.timeout_seconds == 0 {
            return Err(ConfigError::invalid("sources.timeout_seconds must be positive"));
        }

        for id in self.selected_providers()? {
            if self.provider_api_key(id).is_none() {
                return Err(ConfigError::MissingApiKey {
                    provider: id.as_str(),
                    env_var: id.api_key_env_var(),
                });
            }
        }

        Ok(())
    }

    /// Distinct providers referenced by `[sources]`.
    pub fn selected_providers(&self) -> Result<Vec<ProviderId>, ConfigError> {
        let mut ids = vec![self.air_quality_provider_id()?];
        let weather = self.weather_provider_id()?;
        if !ids.contains(&weather) {
            ids.push(weather);
        }
        Ok(ids)
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Set/replace a provider API key and route both readings to it.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.providers
            .entry(provider_id.as_str().to_string())
            .and_modify(|cfg| cfg.api_key = api_key.clone())
            .or_insert(ProviderConfig {
                api_key,
                base_url: None,
            });

        self.sources.air_quality = provider_id.to_string();
        self.sources.weather = provider_id.to_string();
    }

    /// Returns a usable API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.provider_config(provider_id)
            .map(|cfg| cfg.api_key.trim())
            .filter(|key| !key.is_empty() && *key != API_KEY_PLACEHOLDER)
    }
}

fn default_csv_filename() -> PathBuf {
    PathBuf::from("climate_data_log.csv")
}

fn default_provider() -> String {
    ProviderId::OpenWeather.to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}
