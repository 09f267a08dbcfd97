//! ledgerlake: a batch ETL library for loading transaction CSVs into Delta Lake.
//!
//! This library provides components for ingesting a delimited transactions
//! file, cleaning and normalizing it through a fixed transformation sequence,
//! and persisting the result as a versioned Delta Lake table with
//! full-overwrite semantics and an optional read-back verification.
//!
//! # Example
//!
//! ```ignore
//! use ledgerlake::{Config, run_pipeline, error::PipelineError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let config = Config::default();
//!     let stats = run_pipeline(config).await?;
//!     println!("Wrote {} rows", stats.rows_written);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod transform;

// Re-export main types
pub use config::Config;
pub use pipeline::{PipelineStats, run_pipeline};
pub use session::EngineSession;
