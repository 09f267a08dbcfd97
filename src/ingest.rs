//! CSV ingestion.
//!
//! Reads the delimited source into a lazy `DataFrame`, inferring column
//! types from the data. A header row is required. Read failures are fatal
//! to the run; the caller still releases the engine session before exiting.

use datafusion::prelude::{CsvReadOptions, DataFrame, SessionContext};
use snafu::prelude::*;
use tracing::info;

use crate::config::SourceConfig;
use crate::error::{CsvOpenSnafu, IngestError, RowCountSnafu};

/// Reader for the transactions CSV source.
pub struct CsvIngestor {
    config: SourceConfig,
}

impl CsvIngestor {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    /// Open the source file and infer its schema.
    ///
    /// The returned `DataFrame` is lazy; the file is validated (existence,
    /// header parse, type inference) here, but rows are not materialized
    /// until a downstream stage collects them.
    pub async fn read(&self, ctx: &SessionContext) -> Result<DataFrame, IngestError> {
        info!("Reading data from {}", self.config.path);

        let options = CsvReadOptions::new()
            .has_header(true)
            .schema_infer_max_records(self.config.schema_infer_max_records);

        let df = ctx
            .read_csv(&self.config.path, options)
            .await
            .context(CsvOpenSnafu {
                path: self.config.path.clone(),
            })?;

        Ok(df)
    }

    /// Total row count of the source, evaluated by the engine.
    pub async fn count(&self, df: &DataFrame) -> Result<usize, IngestError> {
        df.clone().count().await.context(RowCountSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::session::EngineSession;
    use datafusion::arrow::datatypes::DataType;
    use std::io::Write;

    fn write_csv(dir: &tempfile::TempDir, contents: &str) -> String {
        let path = dir.path().join("transactions.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn ingestor_for(path: String) -> CsvIngestor {
        CsvIngestor::new(SourceConfig {
            path,
            ..SourceConfig::default()
        })
    }

    #[tokio::test]
    async fn test_reads_csv_with_inferred_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "transaction_id,amount,date,currency\n\
             1,10.50,2024-01-01,USD\n\
             2,20.00,2024-01-02,EUR\n",
        );

        let session = EngineSession::new(&EngineConfig::default()).unwrap();
        let ingestor = ingestor_for(path);
        let df = ingestor.read(session.ctx()).await.unwrap();

        let schema = df.schema();
        assert!(schema.has_column_with_unqualified_name("transaction_id"));
        assert!(schema.has_column_with_unqualified_name("currency"));

        let id_field = schema
            .field_with_unqualified_name("transaction_id")
            .unwrap();
        assert_eq!(id_field.data_type(), &DataType::Int64);

        assert_eq!(ingestor.count(&df).await.unwrap(), 2);
        session.shutdown();
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let session = EngineSession::new(&EngineConfig::default()).unwrap();
        let ingestor = ingestor_for("/nonexistent/path/transactions.csv".to_string());

        let result = ingestor.read(session.ctx()).await;
        assert!(matches!(result, Err(IngestError::CsvOpen { .. })));
        session.shutdown();
    }

    #[tokio::test]
    async fn test_extra_columns_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "transaction_id,amount,date,currency,memo\n\
             1,10.50,2024-01-01,USD,coffee\n",
        );

        let session = EngineSession::new(&EngineConfig::default()).unwrap();
        let df = ingestor_for(path).read(session.ctx()).await.unwrap();
        assert!(df.schema().has_column_with_unqualified_name("memo"));
        session.shutdown();
    }
}
