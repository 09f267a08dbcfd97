//! Run configuration.
//!
//! Defaults reproduce the pipeline's canonical behavior (read
//! `mock_transactions.csv`, overwrite `processed_financial_data_delta`,
//! verify after write), so a flagless invocation needs no config file.
//! A YAML file can override any knob.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;

use crate::error::{
    ConfigError, EmptySinkPathSnafu, EmptySourcePathSnafu, ReadFileSnafu, YamlParseSnafu,
    ZeroMemoryLimitSnafu,
};

/// Byte size constants (binary/IEC units).
pub const KB: usize = 1024;
pub const MB: usize = 1024 * KB;

/// Main configuration structure for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    /// Engine tuning (optional).
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            sink: SinkConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// Source configuration for reading the transactions CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the input CSV file (header row required).
    #[serde(default = "default_source_path")]
    pub path: String,

    /// Maximum records examined for schema inference (default: 1000).
    #[serde(default = "default_schema_infer_max_records")]
    pub schema_infer_max_records: usize,

    /// Number of rows shown at each operator checkpoint (default: 5).
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            schema_infer_max_records: default_schema_infer_max_records(),
            sample_rows: default_sample_rows(),
        }
    }
}

/// Sink configuration for writing the Delta table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory path of the Delta table (created on first write).
    #[serde(default = "default_sink_path")]
    pub path: String,

    /// Whether to re-read the table after writing (default: true).
    #[serde(default = "default_verify")]
    pub verify: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: default_sink_path(),
            verify: default_verify(),
        }
    }
}

/// Engine tuning knobs for the compute session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Memory budget for the engine's pooled allocations in MiB (default: 4096).
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: usize,

    /// Record batch size for engine execution (default: 8192).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_limit_mb: default_memory_limit_mb(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_source_path() -> String {
    "mock_transactions.csv".to_string()
}

fn default_sink_path() -> String {
    "processed_financial_data_delta".to_string()
}

fn default_schema_infer_max_records() -> usize {
    1000
}

fn default_sample_rows() -> usize {
    5
}

fn default_verify() -> bool {
    true
}

fn default_memory_limit_mb() -> usize {
    4096
}

fn default_batch_size() -> usize {
    8192
}

impl Config {
    /// Load configuration from a YAML file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
        let config: Config = serde_yaml::from_str(&contents).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.path.trim().is_empty(), EmptySourcePathSnafu);
        ensure!(!self.sink.path.trim().is_empty(), EmptySinkPathSnafu);
        ensure!(self.engine.memory_limit_mb > 0, ZeroMemoryLimitSnafu);
        Ok(())
    }
}
