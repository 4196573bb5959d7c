//! Append-only CSV log of combined readings.
//!
//! One row per successful run, newest at the end. Existing rows are never
//! rewritten. Separate invocations appending at the same time are not
//! coordinated; no file locking is done.

use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Config,
    error::StorageError,
    model::{CombinedRecord, Pollutant},
};

/// Column header of the reading log. Field order of [`LogRow`] must match.
pub const HEADER: [&str; 17] = [
    "timestamp",
    "location",
    "latitude",
    "longitude",
    "aqi",
    "pm2_5",
    "pm10",
    "o3",
    "no2",
    "so2",
    "co",
    "temperature_celsius",
    "feels_like_celsius",
    "humidity_percent",
    "pressure_hpa",
    "wind_speed_mps",
    "description",
];

/// One row of the reading log. Missing values are empty cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
    pub aqi: u32,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub o3: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub temperature_celsius: f64,
    pub feels_like_celsius: Option<f64>,
    pub humidity_percent: u8,
    pub pressure_hpa: Option<f64>,
    pub wind_speed_mps: f64,
    pub description: String,
}

impl From<&CombinedRecord> for LogRow {
    fn from(record: &CombinedRecord) -> Self {
        let air = &record.air_quality;
        let weather = &record.weather;
        Self {
            timestamp: record.recorded_at,
            location: record.location_name.clone(),
            latitude: record.coordinates.latitude,
            longitude: record.coordinates.longitude,
            aqi: air.aqi,
            pm2_5: air.concentration(Pollutant::Pm2_5),
            pm10: air.concentration(Pollutant::Pm10),
            o3: air.concentration(Pollutant::O3),
            no2: air.concentration(Pollutant::No2),
            so2: air.concentration(Pollutant::So2),
            co: air.concentration(Pollutant::Co),
            temperature_celsius: weather.temperature_c,
            feels_like_celsius: weather.feels_like_c,
            humidity_percent: weather.humidity_pct,
            pressure_hpa: weather.pressure_hpa,
            wind_speed_mps: weather.wind_speed_mps,
            description: weather.description.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReadingStore {
    path: PathBuf,
}

impl ReadingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage.csv_filename.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, creating the file with its header first if needed.
    pub fn append(&self, record: &CombinedRecord) -> Result<(), StorageError> {
        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => return Err(self.io_error(e)),
        };

        if needs_header {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        } else {
            self.check_header()?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            wtr.write_record(HEADER).map_err(|e| self.csv_error(e))?;
            info!(path = %self.path.display(), "created reading log with header");
        }
        wtr.serialize(LogRow::from(record)).map_err(|e| self.csv_error(e))?;
        wtr.flush().map_err(|e| self.io_error(e))?;

        debug!(path = %self.path.display(), "appended reading");
        Ok(())
    }

    /// The newest `n` rows, oldest first. A missing log has no rows.
    pub fn tail(&self, n: usize) -> Result<Vec<LogRow>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        self.check_header()?;

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| self.csv_error(e))?;

        let mut rows = rdr
            .deserialize::<LogRow>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.csv_error(e))?;

        let skip = rows.len().saturating_sub(n);
        Ok(rows.split_off(skip))
    }

    /// An existing, non-empty log must start with exactly [`HEADER`].
    fn check_header(&self) -> Result<(), StorageError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| self.csv_error(e))?;

        let mut first = csv::StringRecord::new();
        let has_record = rdr.read_record(&mut first).map_err(|e| self.csv_error(e))?;

        if !has_record || !first.iter().eq(HEADER.iter().copied()) {
            return Err(StorageError::HeaderMismatch {
                path: self.path.clone(),
                found: first.iter().map(String::from).collect(),
            });
        }
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> StorageError {
        StorageError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}
