//! Chunk-oriented load driver
//!
//! Runs one load end to end:
//! 1. Open the source file
//! 2. Provision the target table (once)
//! 3. Read, process and buffer records, committing every `chunk_size`
//!    accepted records and the final partial chunk
//!
//! Each chunk is its own transaction. A failed commit rolls back that chunk
//! only and stops the run; chunks committed before it stay in the table.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::destination::Destination;
use super::error::LoadError;
use super::model::{FileConfig, GenericDataRecord};
use super::processor::{ProcessOutcome, RecordProcessor};
use super::reader::DelimitedRecordReader;
use super::rules::RuleRegistry;
use super::schema::{SchemaProvisioner, TableSchema};
use super::writer::BatchWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunState {
    NotStarted,
    Provisioning,
    Loading { chunks: u64 },
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub records_read: u64,
    pub records_written: u64,
    pub records_skipped: u64,
    pub chunks_committed: u64,
    /// Last source line whose effects are durable
    pub last_committed_line: u64,
}

/// A failed run: the fatal error and what had been committed before it
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    pub error: LoadError,
    pub report: RunReport,
}

/// Receives state changes and per-chunk progress of a run
#[async_trait]
pub trait ProgressListener: Send + Sync {
    async fn on_state(&self, _state: RunState) {}

    async fn on_chunk(&self, _report: &RunReport) {}
}

pub struct ChunkOrchestrator {
    config: Arc<FileConfig>,
    rules: Arc<RuleRegistry>,
    destination: Arc<dyn Destination>,
    listener: Option<Arc<dyn ProgressListener>>,
    state: RunState,
    report: RunReport,
}

impl ChunkOrchestrator {
    pub fn new(
        config: Arc<FileConfig>,
        rules: Arc<RuleRegistry>,
        destination: Arc<dyn Destination>,
    ) -> Self {
        Self {
            config,
            rules,
            destination,
            listener: None,
            state: RunState::NotStarted,
            report: RunReport::default(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the load; a run can only be executed once
    pub async fn run(&mut self) -> Result<RunReport, RunFailure> {
        if self.state != RunState::NotStarted {
            return Err(RunFailure {
                error: LoadError::InvalidConfiguration(format!(
                    "run for {} was already executed",
                    self.config.config_name
                )),
                report: self.report.clone(),
            });
        }

        info!(
            config = %self.config.config_name,
            source = %self.config.source_file_path,
            table = %self.config.target_table_name,
            chunk_size = self.config.chunk_size,
            "Starting load"
        );

        match self.execute().await {
            Ok(()) => {
                self.set_state(RunState::Completed).await;
                info!(
                    config = %self.config.config_name,
                    read = self.report.records_read,
                    written = self.report.records_written,
                    skipped = self.report.records_skipped,
                    chunks = self.report.chunks_committed,
                    "Load completed"
                );
                Ok(self.report.clone())
            }
            Err(error) => {
                self.set_state(RunState::Failed).await;
                warn!(
                    config = %self.config.config_name,
                    kind = error.kind(),
                    error = %error,
                    chunks = self.report.chunks_committed,
                    last_committed_line = self.report.last_committed_line,
                    "Load failed"
                );
                Err(RunFailure {
                    error,
                    report: self.report.clone(),
                })
            }
        }
    }

    async fn execute(&mut self) -> Result<(), LoadError> {
        self.config.validate()?;
        let processor = RecordProcessor::new(self.config.clone(), self.rules.clone());
        processor.check_rules()?;

        let mut reader = DelimitedRecordReader::open(&self.config).await?;

        self.set_state(RunState::Provisioning).await;
        let schema = Arc::new(TableSchema::from_config(&self.config)?);
        SchemaProvisioner::new(self.destination.clone())
            .provision(&schema)
            .await?;

        self.set_state(RunState::Loading { chunks: 0 }).await;
        let writer = BatchWriter::new(self.destination.clone(), schema);
        let mut buffer: Vec<GenericDataRecord> = Vec::with_capacity(self.config.chunk_size);

        while let Some(record) = reader.next_record().await? {
            self.report.records_read += 1;

            match processor.process(record)? {
                ProcessOutcome::Accepted(record) => buffer.push(record),
                ProcessOutcome::Rejected { .. } => self.report.records_skipped += 1,
                ProcessOutcome::Unconfigured => {
                    return Err(LoadError::InvalidConfiguration(format!(
                        "no configuration bound for {}",
                        self.config.config_name
                    )));
                }
            }

            if buffer.len() >= self.config.chunk_size {
                self.flush(&writer, &mut buffer, reader.lines_read()).await?;
            }
        }

        if !buffer.is_empty() {
            self.flush(&writer, &mut buffer, reader.lines_read()).await?;
        }
        // Every consumed line is now either committed or skipped.
        self.report.last_committed_line = reader.lines_read();

        Ok(())
    }

    async fn flush(
        &mut self,
        writer: &BatchWriter,
        buffer: &mut Vec<GenericDataRecord>,
        position: u64,
    ) -> Result<(), LoadError> {
        let chunk = self.report.chunks_committed + 1;
        let written = writer.write(chunk, buffer).await?;
        buffer.clear();

        self.report.records_written += written;
        self.report.chunks_committed = chunk;
        self.report.last_committed_line = position;
        self.state = RunState::Loading { chunks: chunk };

        if let Some(listener) = &self.listener {
            listener.on_chunk(&self.report).await;
        }
        Ok(())
    }

    async fn set_state(&mut self, state: RunState) {
        self.state = state;
        if let Some(listener) = &self.listener {
            listener.on_state(state).await;
        }
    }
}
