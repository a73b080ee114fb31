//! Load pipeline errors
//!
//! Every variant here is fatal for a run. Validation rejections are not
//! errors: they come back as [`ProcessOutcome::Rejected`] and the run goes on.
//!
//! [`ProcessOutcome::Rejected`]: super::processor::ProcessOutcome::Rejected

use std::path::PathBuf;

use flatload_common::CommonError;
use thiserror::Error;

/// Failure reported by a [`Destination`](super::destination::Destination)
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record on line {line} has no value for column {column}")]
    IncompleteRecord { line: u64, column: String },

    #[error("Line {line}: {message}")]
    Rejected { line: u64, message: String },

    #[error("Invalid table schema: {0}")]
    InvalidSchema(String),

    #[error("Table {0} has not been provisioned")]
    MissingTable(String),

    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Errors that stop a load run
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Configuration not found or inactive: {0}")]
    ConfigurationMissing(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to open source file {path}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read source file after line {line}: {source}")]
    SourceRead {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Line {line}: expected {expected} fields, found {actual}")]
    RecordParse {
        line: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid validation rule '{rule}' on column {column}: {reason}")]
    InvalidRule {
        column: String,
        rule: String,
        reason: String,
    },

    #[error("Unknown data type '{data_type}' for column {column}")]
    UnknownDataType { column: String, data_type: String },

    #[error("Failed to provision table {table}: {source}")]
    Provisioning {
        table: String,
        #[source]
        source: DestinationError,
    },

    #[error("Commit of chunk {chunk} failed: {source}")]
    ChunkCommit {
        chunk: u64,
        #[source]
        source: DestinationError,
    },
}

impl From<CommonError> for LoadError {
    fn from(err: CommonError) -> Self {
        LoadError::InvalidConfiguration(err.to_string())
    }
}

impl LoadError {
    /// Short machine-readable kind, stored with failed runs
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::ConfigurationMissing(_) => "configuration_missing",
            LoadError::InvalidConfiguration(_) => "invalid_configuration",
            LoadError::SourceOpen { .. } => "source_open",
            LoadError::SourceRead { .. } => "source_read",
            LoadError::RecordParse { .. } => "record_parse",
            LoadError::InvalidRule { .. } => "invalid_rule",
            LoadError::UnknownDataType { .. } => "unknown_data_type",
            LoadError::Provisioning { .. } => "provisioning",
            LoadError::ChunkCommit { .. } => "chunk_commit",
        }
    }
}
