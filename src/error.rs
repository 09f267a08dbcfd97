//! Error types for ledgerlake using snafu.
//!
//! One error enum per pipeline stage, aggregated into a top-level
//! [`PipelineError`] that names the failing stage in its display output.

use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use snafu::prelude::*;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source path is empty.
    #[snafu(display("Source path cannot be empty"))]
    EmptySourcePath,

    /// Sink path is empty.
    #[snafu(display("Sink path cannot be empty"))]
    EmptySinkPath,

    /// Memory budget of zero would stall every engine operation.
    #[snafu(display("Engine memory limit must be greater than zero"))]
    ZeroMemoryLimit,

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },
}

// ============ Session Errors ============

/// Errors that can occur while bootstrapping the engine session.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SessionError {
    /// The engine runtime environment could not be built.
    #[snafu(display("Failed to initialize engine runtime"))]
    Runtime { source: DataFusionError },
}

// ============ Ingest Errors ============

/// Errors that can occur while reading the source file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    /// The source CSV could not be opened or parsed.
    #[snafu(display("Failed to read CSV from {path}"))]
    CsvOpen {
        path: String,
        source: DataFusionError,
    },

    /// Counting the ingested rows failed during evaluation.
    #[snafu(display("Failed to count ingested rows"))]
    RowCount { source: DataFusionError },

    /// Collecting the post-ingest sample failed during evaluation.
    #[snafu(display("Failed to collect row sample"))]
    SampleCollect { source: DataFusionError },
}

// ============ Transform Errors ============

/// Errors that can occur while building or evaluating the transformation plan.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// A transformation stage could not be planned (e.g. a required column
    /// is missing from the inferred schema).
    #[snafu(display("Failed to apply {stage} stage"))]
    Stage {
        stage: &'static str,
        source: DataFusionError,
    },

    /// Evaluating the transformation plan failed.
    #[snafu(display("Failed to evaluate transformation plan"))]
    Collect { source: DataFusionError },

    /// The deduplication key column has an unexpected layout.
    #[snafu(display("Deduplication key error: {message}"))]
    DedupKey { message: String },

    /// Applying the deduplication mask failed.
    #[snafu(display("Failed to filter duplicate rows"))]
    DedupFilter { source: ArrowError },
}

// ============ Sink Errors ============

/// Errors that can occur while persisting or verifying the Delta table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// The output location could not be resolved to a table URI.
    #[snafu(display("Failed to resolve table location {path}"))]
    ResolvePath {
        path: String,
        source: std::io::Error,
    },

    /// The Delta table handle could not be constructed.
    #[snafu(display("Failed to open Delta table at {uri}"))]
    TableUri {
        uri: String,
        source: deltalake::DeltaTableError,
    },

    /// The overwrite commit failed.
    #[snafu(display("Failed to write Delta table"))]
    Write { source: deltalake::DeltaTableError },

    /// The verification read could not start.
    #[snafu(display("Failed to load Delta table for verification"))]
    Load { source: deltalake::DeltaTableError },

    /// The verification read failed while streaming batches back.
    #[snafu(display("Failed to read back Delta table contents"))]
    ReadBack { source: DataFusionError },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors aggregating the per-stage error types.
///
/// Only fatal conditions surface here: configuration, session bootstrap,
/// ingestion, and transformation failures. Sink and verification errors are
/// reported by the pipeline and degrade gracefully without aborting the run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Session bootstrap error.
    #[snafu(display("Session bootstrap error"))]
    Session { source: SessionError },

    /// Ingestion error.
    #[snafu(display("Ingestion error"))]
    Ingest { source: IngestError },

    /// Transformation error.
    #[snafu(display("Transformation error"))]
    Transform { source: TransformError },
}
