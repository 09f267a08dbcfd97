//! Cleaning and transformation stages.
//!
//! A fixed, ordered sequence of pure table-level operations:
//!
//! 1. Drop rows missing `transaction_id` or `amount` (critical fields).
//! 2. Normalize types: `amount` to Float64, `date` to Date32,
//!    `transaction_id` to Int32. Values that cannot be coerced become null
//!    (TRY_CAST semantics) rather than aborting the run.
//! 3. Fill absent `currency` values with the literal "UNKNOWN".
//! 4. Deduplicate on `transaction_id`, keeping the first occurrence in
//!    source row order.
//!
//! Stages 1-3 are planned lazily on the engine; deduplication runs over the
//! collected batches so that "first occurrence" is an explicit, deterministic
//! total order (plan order of the scan) instead of whatever order a
//! parallelized execution happens to produce.

use std::collections::HashSet;
use std::sync::Arc;

use datafusion::arrow::array::{Array, BooleanArray, Int32Array, RecordBatch};
use datafusion::arrow::compute::filter_record_batch;
use datafusion::arrow::datatypes::{DataType, SchemaRef};
use datafusion::prelude::*;
use snafu::prelude::*;
use tracing::{debug, info};

use crate::error::{CollectSnafu, DedupFilterSnafu, DedupKeySnafu, StageSnafu, TransformError};

/// Critical key column; rows without it are dropped, and it is the
/// deduplication key.
pub const TRANSACTION_ID: &str = "transaction_id";
/// Critical value column; rows without it are dropped.
pub const AMOUNT: &str = "amount";
/// Calendar date column; unparsable values degrade to null.
pub const DATE: &str = "date";
/// Currency code column; absent values are defaulted.
pub const CURRENCY: &str = "currency";
/// Sentinel filled into absent currency values.
pub const UNKNOWN_CURRENCY: &str = "UNKNOWN";

/// The transformed table, materialized and ready for the sink.
pub struct TransformOutput {
    /// Schema after type normalization.
    pub schema: SchemaRef,
    /// Deduplicated record batches in source row order.
    pub batches: Vec<RecordBatch>,
    /// Rows surviving the null-filter, before deduplication.
    pub rows_before_dedup: usize,
    /// Rows in the final output.
    pub rows_out: usize,
}

impl TransformOutput {
    /// Number of rows removed as duplicates.
    pub fn duplicates_removed(&self) -> usize {
        self.rows_before_dedup - self.rows_out
    }
}

/// Apply the full transformation sequence and materialize the result.
pub async fn apply(df: DataFrame) -> Result<TransformOutput, TransformError> {
    let df = drop_critical_nulls(df)?;
    let df = normalize_types(df)?;
    let df = fill_missing_currency(df)?;

    let schema: SchemaRef = Arc::new(df.schema().as_arrow().clone());
    let batches = df.collect().await.context(CollectSnafu)?;
    let rows_before_dedup: usize = batches.iter().map(RecordBatch::num_rows).sum();

    let (mut batches, rows_out) = dedup_first_seen(batches)?;
    if batches.is_empty() {
        // Preserve the schema even when every row was filtered out, so the
        // sink still writes a (versioned, empty) table.
        batches.push(RecordBatch::new_empty(Arc::clone(&schema)));
    }

    info!(
        "Transformation complete: {} rows retained, {} duplicates removed",
        rows_out,
        rows_before_dedup - rows_out
    );

    Ok(TransformOutput {
        schema,
        batches,
        rows_before_dedup,
        rows_out,
    })
}

/// Stage 1: remove rows missing either critical field.
fn drop_critical_nulls(df: DataFrame) -> Result<DataFrame, TransformError> {
    df.filter(
        col(TRANSACTION_ID)
            .is_not_null()
            .and(col(AMOUNT).is_not_null()),
    )
    .context(StageSnafu {
        stage: "null-filter",
    })
}

/// Stage 2: coerce critical columns to their canonical types.
///
/// TRY_CAST turns uncoercible values into nulls instead of failing the plan,
/// so a malformed date or amount degrades locally rather than aborting.
fn normalize_types(df: DataFrame) -> Result<DataFrame, TransformError> {
    let stage = "type-normalization";
    let df = df
        .with_column(AMOUNT, try_cast(col(AMOUNT), DataType::Float64))
        .context(StageSnafu { stage })?;
    let df = df
        .with_column(DATE, try_cast(col(DATE), DataType::Date32))
        .context(StageSnafu { stage })?;
    df.with_column(TRANSACTION_ID, try_cast(col(TRANSACTION_ID), DataType::Int32))
        .context(StageSnafu { stage })
}

/// Stage 3: default absent currency values to the sentinel.
///
/// CSV sources represent an absent text value as either null or an empty
/// string depending on how the line was written; both count as absent here.
/// A source with no currency column at all leaves the table unchanged.
fn fill_missing_currency(df: DataFrame) -> Result<DataFrame, TransformError> {
    if !df.schema().has_column_with_unqualified_name(CURRENCY) {
        debug!("No currency column in source; skipping default-fill");
        return Ok(df);
    }

    let stage = "default-fill";
    let absent = col(CURRENCY).is_null().or(col(CURRENCY).eq(lit("")));
    let filled = when(absent, lit(UNKNOWN_CURRENCY))
        .otherwise(col(CURRENCY))
        .context(StageSnafu { stage })?;
    df.with_column(CURRENCY, filled).context(StageSnafu { stage })
}

/// Stage 4: keep the first row per `transaction_id`, in batch/row order.
///
/// Ids that coerced to null form a single key group with one survivor, the
/// same way the engine's drop-duplicates treats null keys. Returns the
/// filtered batches and the retained row count; batches left empty by the
/// filter are discarded.
pub(crate) fn dedup_first_seen(
    batches: Vec<RecordBatch>,
) -> Result<(Vec<RecordBatch>, usize), TransformError> {
    let mut seen: HashSet<Option<i32>> = HashSet::new();
    let mut out = Vec::with_capacity(batches.len());
    let mut rows_out = 0;

    for batch in batches {
        let schema = batch.schema();
        let (idx, _) = schema.column_with_name(TRANSACTION_ID).context(DedupKeySnafu {
            message: format!("column {TRANSACTION_ID} missing from batch"),
        })?;
        let ids = batch
            .column(idx)
            .as_any()
            .downcast_ref::<Int32Array>()
            .context(DedupKeySnafu {
                message: format!("column {TRANSACTION_ID} is not Int32 after normalization"),
            })?;

        let mask: BooleanArray = (0..batch.num_rows())
            .map(|row| {
                let key = if ids.is_null(row) {
                    None
                } else {
                    Some(ids.value(row))
                };
                Some(seen.insert(key))
            })
            .collect();

        let filtered = filter_record_batch(&batch, &mask).context(DedupFilterSnafu)?;
        rows_out += filtered.num_rows();
        if filtered.num_rows() > 0 {
            out.push(filtered);
        }
    }

    Ok((out, rows_out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::session::EngineSession;
    use datafusion::arrow::array::{Date32Array, Float64Array, Int64Array, StringArray};
    use datafusion::arrow::datatypes::{Field, Schema};

    fn raw_batch(
        ids: Vec<Option<i64>>,
        amounts: Vec<Option<f64>>,
        dates: Vec<Option<&str>>,
        currencies: Vec<Option<&str>>,
    ) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new(TRANSACTION_ID, DataType::Int64, true),
            Field::new(AMOUNT, DataType::Float64, true),
            Field::new(DATE, DataType::Utf8, true),
            Field::new(CURRENCY, DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(Float64Array::from(amounts)),
                Arc::new(StringArray::from(dates)),
                Arc::new(StringArray::from(currencies)),
            ],
        )
        .unwrap()
    }

    async fn run_transform(batch: RecordBatch) -> TransformOutput {
        let session = EngineSession::new(&EngineConfig::default()).unwrap();
        let df = session.ctx().read_batch(batch).unwrap();
        let output = apply(df).await.unwrap();
        session.shutdown();
        output
    }

    fn column_i32(batches: &[RecordBatch], name: &str) -> Vec<Option<i32>> {
        let mut values = Vec::new();
        for batch in batches {
            let schema = batch.schema();
            let (idx, _) = schema.column_with_name(name).unwrap();
            let array = batch
                .column(idx)
                .as_any()
                .downcast_ref::<Int32Array>()
                .unwrap()
                .clone();
            for row in 0..array.len() {
                values.push((!array.is_null(row)).then(|| array.value(row)));
            }
        }
        values
    }

    fn column_str(batches: &[RecordBatch], name: &str) -> Vec<Option<String>> {
        let mut values = Vec::new();
        for batch in batches {
            let schema = batch.schema();
            let (idx, _) = schema.column_with_name(name).unwrap();
            let array = batch
                .column(idx)
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap()
                .clone();
            for row in 0..array.len() {
                values.push((!array.is_null(row)).then(|| array.value(row).to_string()));
            }
        }
        values
    }

    #[tokio::test]
    async fn test_rows_missing_critical_fields_are_dropped() {
        let batch = raw_batch(
            vec![Some(1), None, Some(3)],
            vec![Some(10.0), Some(20.0), None],
            vec![Some("2024-01-01"), Some("2024-01-02"), Some("2024-01-03")],
            vec![Some("USD"), Some("EUR"), Some("GBP")],
        );
        let output = run_transform(batch).await;
        assert_eq!(output.rows_out, 1);
        assert_eq!(column_i32(&output.batches, TRANSACTION_ID), vec![Some(1)]);
    }

    #[tokio::test]
    async fn test_types_are_normalized() {
        let batch = raw_batch(
            vec![Some(1)],
            vec![Some(10.5)],
            vec![Some("2024-01-01")],
            vec![Some("USD")],
        );
        let output = run_transform(batch).await;

        let schema = &output.schema;
        assert_eq!(
            schema.field_with_name(TRANSACTION_ID).unwrap().data_type(),
            &DataType::Int32
        );
        assert_eq!(
            schema.field_with_name(AMOUNT).unwrap().data_type(),
            &DataType::Float64
        );
        assert_eq!(
            schema.field_with_name(DATE).unwrap().data_type(),
            &DataType::Date32
        );
    }

    #[tokio::test]
    async fn test_unparsable_date_becomes_null_row_retained() {
        let batch = raw_batch(
            vec![Some(1), Some(2)],
            vec![Some(10.0), Some(20.0)],
            vec![Some("2024-01-01"), Some("not-a-date")],
            vec![Some("USD"), Some("USD")],
        );
        let output = run_transform(batch).await;
        assert_eq!(output.rows_out, 2);

        let dates: Vec<bool> = output
            .batches
            .iter()
            .flat_map(|batch| {
                let schema = batch.schema();
                let (idx, _) = schema.column_with_name(DATE).unwrap();
                let array = batch
                    .column(idx)
                    .as_any()
                    .downcast_ref::<Date32Array>()
                    .unwrap()
                    .clone();
                (0..array.len()).map(move |row| array.is_null(row)).collect::<Vec<_>>()
            })
            .collect();
        assert_eq!(dates, vec![false, true]);
    }

    #[tokio::test]
    async fn test_absent_currency_is_filled() {
        let batch = raw_batch(
            vec![Some(1), Some(2), Some(3)],
            vec![Some(10.0), Some(20.0), Some(30.0)],
            vec![Some("2024-01-01"); 3],
            vec![None, Some(""), Some("USD")],
        );
        let output = run_transform(batch).await;
        assert_eq!(
            column_str(&output.batches, CURRENCY),
            vec![
                Some(UNKNOWN_CURRENCY.to_string()),
                Some(UNKNOWN_CURRENCY.to_string()),
                Some("USD".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_currency_column_is_noop() {
        let schema = Arc::new(Schema::new(vec![
            Field::new(TRANSACTION_ID, DataType::Int64, true),
            Field::new(AMOUNT, DataType::Float64, true),
            Field::new(DATE, DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1)])),
                Arc::new(Float64Array::from(vec![Some(10.0)])),
                Arc::new(StringArray::from(vec![Some("2024-01-01")])),
            ],
        )
        .unwrap();
        let output = run_transform(batch).await;
        assert_eq!(output.rows_out, 1);
        assert!(output.schema.field_with_name(CURRENCY).is_err());
    }

    #[tokio::test]
    async fn test_duplicates_keep_first_occurrence() {
        let batch = raw_batch(
            vec![Some(1), Some(2), Some(1)],
            vec![Some(10.0), Some(20.0), Some(99.0)],
            vec![Some("2024-01-01"); 3],
            vec![Some("USD"); 3],
        );
        let output = run_transform(batch).await;
        assert_eq!(output.rows_out, 2);
        assert_eq!(output.duplicates_removed(), 1);
        assert_eq!(
            column_i32(&output.batches, TRANSACTION_ID),
            vec![Some(1), Some(2)]
        );

        // The surviving id=1 row must be the first one (amount 10.0).
        let schema = output.batches[0].schema();
        let (idx, _) = schema.column_with_name(AMOUNT).unwrap();
        let amounts = output.batches[0]
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .clone();
        assert_eq!(amounts.value(0), 10.0);
    }

    #[test]
    fn test_dedup_across_batches_and_null_keys() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            TRANSACTION_ID,
            DataType::Int32,
            true,
        )]));
        let first = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int32Array::from(vec![Some(1), None, Some(2)]))],
        )
        .unwrap();
        let second = RecordBatch::try_new(
            schema,
            vec![Arc::new(Int32Array::from(vec![Some(2), None, Some(3)]))],
        )
        .unwrap();

        let (batches, rows_out) = dedup_first_seen(vec![first, second]).unwrap();
        assert_eq!(rows_out, 4);
        assert_eq!(
            column_i32(&batches, TRANSACTION_ID),
            vec![Some(1), None, Some(2), Some(3)]
        );
    }

    #[test]
    fn test_dedup_empty_input() {
        let (batches, rows_out) = dedup_first_seen(Vec::new()).unwrap();
        assert!(batches.is_empty());
        assert_eq!(rows_out, 0);
    }
}
