//! Metadata-driven loading of delimited files
//!
//! A [`FileConfig`] names a source file, a target table, and the ordered
//! columns with their types and rules. A run reads the file line by line,
//! applies the rules, and commits accepted records to the target table in
//! chunks, each chunk in its own transaction.
//!
//! ```text
//! DelimitedRecordReader -> RecordProcessor -> buffer -> BatchWriter -> Destination
//!                                    \__________ ChunkOrchestrator __________/
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use flatload_server::load::{
//!     ChunkOrchestrator, ColumnConfig, FileConfig, MemoryDestination, RuleRegistry,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = FileConfig::new("employees", "/data/employees.csv", "employees")
//!     .with_column(ColumnConfig::new("id", "id", "NUMBER", 1).with_validation("NUMERIC"))
//!     .with_column(ColumnConfig::new("name", "name", "STRING", 2).with_transformation("UPPER"));
//!
//! let report = ChunkOrchestrator::new(
//!     Arc::new(config),
//!     Arc::new(RuleRegistry::default()),
//!     Arc::new(MemoryDestination::new()),
//! )
//! .run()
//! .await?;
//! println!("{} rows written", report.records_written);
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod destination;
pub mod error;
pub mod executor;
pub mod model;
pub mod orchestrator;
pub mod processor;
pub mod reader;
pub mod rules;
pub mod schema;
pub mod writer;

pub use analytics::{PostLoadAnalytics, TableProfile, TableProfiler};
pub use destination::{Destination, MemoryDestination, PgDestination};
pub use error::{DestinationError, LoadError};
pub use executor::{
    ExecutorSettings, LoadExecutor, SubmitError, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT,
};
pub use model::{ColumnConfig, FileConfig, GenericDataRecord};
pub use orchestrator::{ChunkOrchestrator, ProgressListener, RunFailure, RunReport, RunState};
pub use processor::{ProcessOutcome, RecordProcessor};
pub use reader::DelimitedRecordReader;
pub use rules::RuleRegistry;
pub use schema::{SchemaProvisioner, SqlType, TableSchema};
pub use writer::BatchWriter;
