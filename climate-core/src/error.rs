//! Error types for each pipeline stage.
//!
//! Every stage fails with its own error type so the caller can tell which
//! stage aborted the run. [`PipelineError`] wraps them for the runner.

use std::{io, path::PathBuf};

use reqwest::StatusCode;
use thiserror::Error;

/// Bad or missing configuration. Always raised before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No API key configured for provider '{provider}'.\nHint: set [providers.{provider}] api_key in the config file or export {env_var}.")]
    MissingApiKey {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("Unknown provider '{0}'. Supported providers: openweather, weatherapi.")]
    UnknownProvider(String),

    #[error("Could not determine platform config directory")]
    NoConfigDir,

    #[error("Failed to serialize configuration to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Network or data-shape failure from a data source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to send request to {provider}: {source}")]
    Request {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} request failed with status {status}: {body}")]
    Status {
        provider: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to parse {provider} response: {source}")]
    Parse {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider} response is missing {field}")]
    MissingField {
        provider: &'static str,
        field: &'static str,
    },
}

/// Failure to append to or read the reading log.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on reading log {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error on reading log {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Reading log {} has an unexpected header: [{}]", .path.display(), .found.join(","))]
    HeaderMismatch { path: PathBuf, found: Vec<String> },
}

/// The stage a run failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Fetch,
    Storage,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Config => "configuration",
            Stage::Fetch => "fetch",
            Stage::Storage => "storage",
            Stage::Report => "report",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any failure that aborts a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration stage failed")]
    Config(#[from] ConfigError),

    #[error("fetch stage failed")]
    Fetch(#[from] FetchError),

    #[error("storage stage failed")]
    Storage(#[from] StorageError),

    #[error("report stage failed: output unavailable")]
    Report(#[source] io::Error),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config(_) => Stage::Config,
            PipelineError::Fetch(_) => Stage::Fetch,
            PipelineError::Storage(_) => Stage::Storage,
            PipelineError::Report(_) => Stage::Report,
        }
    }
}
