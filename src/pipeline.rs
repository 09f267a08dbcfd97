//! Pipeline orchestration.
//!
//! Threads one table through the four stages strictly in sequence: session
//! bootstrap, ingestion, transformation, sink. Control flows top to bottom
//! with no branching beyond error short-circuits.
//!
//! Error policy (one rule per stage):
//! - ingestion and transformation failures abort the run, after the engine
//!   session has been released;
//! - write failures are reported and the run proceeds to teardown with a
//!   normal exit;
//! - verification failures are purely informational.

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::datatypes::Schema;
use datafusion::error::DataFusionError;
use datafusion::prelude::DataFrame;
use datafusion::arrow::util::pretty::pretty_format_batches;
use snafu::prelude::*;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{IngestSnafu, PipelineError, SampleCollectSnafu, SessionSnafu, TransformSnafu};
use crate::ingest::CsvIngestor;
use crate::session::EngineSession;
use crate::sink::DeltaSink;
use crate::transform;

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub rows_ingested: usize,
    pub rows_dropped_nulls: usize,
    pub duplicates_removed: usize,
    pub rows_written: usize,
    /// Version produced by the overwrite commit, if the write succeeded.
    pub delta_version: Option<i64>,
    /// Rows read back by verification, if it ran and succeeded.
    pub rows_verified: Option<usize>,
}

/// Run the pipeline to completion.
///
/// The engine session is acquired once here and released exactly once on
/// every exit path, including the early abort after an ingestion failure.
pub async fn run_pipeline(config: Config) -> Result<PipelineStats, PipelineError> {
    let session = EngineSession::new(&config.engine).context(SessionSnafu)?;
    let result = execute(&session, &config).await;
    session.shutdown();
    result
}

async fn execute(
    session: &EngineSession,
    config: &Config,
) -> Result<PipelineStats, PipelineError> {
    let mut stats = PipelineStats::default();

    // Stage 1: ingest. Failure here is fatal; the caller still releases the
    // session before the process exits non-zero.
    let ingestor = CsvIngestor::new(config.source.clone());
    let df = ingestor.read(session.ctx()).await.context(IngestSnafu)?;
    stats.rows_ingested = ingestor.count(&df).await.context(IngestSnafu)?;
    info!("Data ingested successfully ({} rows)", stats.rows_ingested);

    let sample = head(&df, config.source.sample_rows)
        .await
        .context(SampleCollectSnafu)
        .context(IngestSnafu)?;
    print_checkpoint("Ingested", df.schema().as_arrow(), &sample);

    // Stage 2: transform. Engine evaluation failures here are fatal.
    let output = transform::apply(df).await.context(TransformSnafu)?;
    stats.rows_dropped_nulls = stats.rows_ingested - output.rows_before_dedup;
    stats.duplicates_removed = output.duplicates_removed();
    stats.rows_written = output.rows_out;
    print_checkpoint(
        "Transformed",
        &output.schema,
        &first_rows(&output.batches, config.source.sample_rows),
    );

    // Stage 3: sink. Write failures degrade to a diagnostic; the run still
    // reaches teardown and exits normally.
    info!("Writing processed data to Delta table at {}", config.sink.path);
    match persist(&config.sink.path, output.batches).await {
        Ok(version) => {
            stats.delta_version = Some(version);
            info!("Data successfully written to Delta table");

            if config.sink.verify {
                verify(&config.sink.path, &mut stats).await;
            } else {
                info!("Verification disabled; skipping read-back");
            }
        }
        Err(e) => {
            error!(
                "Error writing to Delta table at {}: {}",
                config.sink.path, e
            );
        }
    }

    Ok(stats)
}

async fn persist(path: &str, batches: Vec<RecordBatch>) -> Result<i64, crate::error::SinkError> {
    let sink = DeltaSink::new(path)?;
    sink.write_overwrite(batches).await
}

/// Re-read the persisted table and display it. Failures are informational.
async fn verify(path: &str, stats: &mut PipelineStats) {
    info!("Verifying data from Delta table at {}", path);
    let sink = match DeltaSink::new(path) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Error reading Delta table for verification: {}", e);
            return;
        }
    };
    match sink.read_back().await {
        Ok((version, batches)) => {
            let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
            stats.rows_verified = Some(rows);
            if let Some(first) = batches.first() {
                print_checkpoint("Verified", first.schema().as_ref(), &batches);
            }
            info!(
                "Delta table read verification successful ({} rows at version {})",
                rows, version
            );
        }
        Err(e) => {
            error!("Error reading Delta table for verification: {}", e);
        }
    }
}

async fn head(df: &DataFrame, limit: usize) -> Result<Vec<RecordBatch>, DataFusionError> {
    df.clone().limit(0, Some(limit))?.collect().await
}

/// Take the first `limit` rows across the batches without copying columns.
fn first_rows(batches: &[RecordBatch], limit: usize) -> Vec<RecordBatch> {
    let mut remaining = limit;
    let mut out = Vec::new();
    for batch in batches {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.num_rows());
        if take > 0 {
            out.push(batch.slice(0, take));
            remaining -= take;
        }
    }
    out
}

/// Operator-facing checkpoint: schema via the log, rows on stdout.
fn print_checkpoint(label: &str, schema: &Schema, batches: &[RecordBatch]) {
    info!("{} schema:", label);
    for field in schema.fields() {
        info!(
            "  - {}: {:?} (nullable: {})",
            field.name(),
            field.data_type(),
            field.is_nullable()
        );
    }
    match pretty_format_batches(batches) {
        Ok(table) => println!("{table}"),
        Err(e) => warn!("Failed to render row sample: {}", e),
    }
}
