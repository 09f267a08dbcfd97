//! ledgerlake: a batch ETL tool for loading transaction CSVs into Delta Lake.
//!
//! Reads a CSV of financial transactions, applies null-filtering, type
//! normalization, currency default-filling and deduplication, then persists
//! the result as a versioned Delta Lake table in full-overwrite mode, with
//! an optional read-back verification step.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ledgerlake::config::Config;
use ledgerlake::error::{ConfigSnafu, PipelineError};
use ledgerlake::run_pipeline;

/// CSV to Delta Lake batch ETL tool.
#[derive(Parser, Debug)]
#[command(name = "ledgerlake")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an optional YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input CSV path (overrides the configuration).
    #[arg(long)]
    input: Option<String>,

    /// Delta table output path (overrides the configuration).
    #[arg(long)]
    output: Option<String>,

    /// Skip the post-write verification read.
    #[arg(long)]
    no_verify: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate configuration without processing.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let args = Args::parse();

    // Initialize logging; engine internals stay quiet unless RUST_LOG says otherwise.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},datafusion=warn,deltalake=warn",
            args.log_level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("ledgerlake starting");

    let config = build_config(&args)?;

    if args.dry_run {
        info!("Dry run mode - validating configuration");
        info!("Source: {}", config.source.path);
        info!("Sink: {}", config.sink.path);
        info!("Verify after write: {}", config.sink.verify);
        info!("Engine memory limit: {} MiB", config.engine.memory_limit_mb);
        info!("Configuration is valid");
        return Ok(());
    }

    let stats = run_pipeline(config).await?;

    info!("Pipeline completed successfully");
    info!("  Rows ingested: {}", stats.rows_ingested);
    info!("  Rows dropped (null critical fields): {}", stats.rows_dropped_nulls);
    info!("  Duplicates removed: {}", stats.duplicates_removed);
    info!("  Rows written: {}", stats.rows_written);
    if let Some(version) = stats.delta_version {
        info!("  Delta table version: {}", version);
    }
    if let Some(rows) = stats.rows_verified {
        info!("  Rows verified: {}", rows);
    }

    Ok(())
}

/// Build configuration from arguments.
fn build_config(args: &Args) -> Result<Config, PipelineError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path).context(ConfigSnafu)?,
        None => Config::default(),
    };

    if let Some(input) = &args.input {
        config.source.path = input.clone();
    }
    if let Some(output) = &args.output {
        config.sink.path = output.clone();
    }
    if args.no_verify {
        config.sink.verify = false;
    }

    config.validate().context(ConfigSnafu)?;
    Ok(config)
}
