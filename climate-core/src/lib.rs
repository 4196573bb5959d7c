//! Core library for the `climate` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Air-quality and weather sources behind small traits
//! - The append-only CSV reading log
//! - Threshold evaluation and reporting
//! - The pipeline that runs those stages once, in order
//!
//! It is used by `climate-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod evaluate;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod store;

pub use config::{Config, Location, ProviderConfig, Thresholds};
pub use error::{ConfigError, FetchError, PipelineError, Stage, StorageError};
pub use evaluate::evaluate;
pub use model::{AirQualityReading, CombinedRecord, Coordinates, EvaluationResult, Pollutant, WeatherReading};
pub use pipeline::{Pipeline, RunOutcome, run_once};
pub use provider::{AirQualitySource, ProviderId, WeatherSource};
pub use report::report;
pub use store::{LogRow, ReadingStore};
