//! Chunk writer

use std::sync::Arc;

use tracing::debug;

use super::destination::Destination;
use super::error::LoadError;
use super::model::GenericDataRecord;
use super::schema::TableSchema;

/// Writes one chunk of accepted records per call, atomically
pub struct BatchWriter {
    destination: Arc<dyn Destination>,
    schema: Arc<TableSchema>,
}

impl BatchWriter {
    pub fn new(destination: Arc<dyn Destination>, schema: Arc<TableSchema>) -> Self {
        Self { destination, schema }
    }

    /// Insert `records` as chunk number `chunk` (1-based)
    ///
    /// On error nothing from this chunk is stored; earlier chunks are not
    /// affected.
    pub async fn write(&self, chunk: u64, records: &[GenericDataRecord]) -> Result<u64, LoadError> {
        let written = self
            .destination
            .insert_chunk(&self.schema, records)
            .await
            .map_err(|source| LoadError::ChunkCommit { chunk, source })?;

        debug!(
            table = %self.schema.table_name,
            chunk,
            rows = written,
            "Committed chunk"
        );
        Ok(written)
    }
}
