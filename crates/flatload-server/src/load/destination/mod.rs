//! Destination store contract
//!
//! A destination owns the target tables. Each `insert_chunk` call is one
//! transaction: either every record of the chunk is stored or none is.

mod memory;
mod postgres;

pub use memory::MemoryDestination;
pub use postgres::PgDestination;

use async_trait::async_trait;

use super::analytics::TableProfile;
use super::error::DestinationError;
use super::model::GenericDataRecord;
use super::schema::TableSchema;

#[async_trait]
pub trait Destination: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool, DestinationError>;

    /// Create the table if it is absent; an existing table is left as is
    async fn create_table(&self, schema: &TableSchema) -> Result<(), DestinationError>;

    /// Insert all records atomically, returning the number of rows stored
    async fn insert_chunk(
        &self,
        schema: &TableSchema,
        records: &[GenericDataRecord],
    ) -> Result<u64, DestinationError>;

    /// Row count plus per-column null, empty and distinct counts
    async fn profile_table(&self, schema: &TableSchema) -> Result<TableProfile, DestinationError>;
}

/// Values of a record in schema column order
///
/// Every configured column must be present in the record, null or not.
/// A blank value bound for a non-character column is stored as NULL.
pub(crate) fn row_values(
    schema: &TableSchema,
    record: &GenericDataRecord,
) -> Result<Vec<Option<String>>, DestinationError> {
    schema
        .columns
        .iter()
        .map(|column| {
            if !record.has_column(&column.source_name) {
                return Err(DestinationError::IncompleteRecord {
                    line: record.line(),
                    column: column.source_name.clone(),
                });
            }
            let value = record
                .value(&column.source_name)
                .filter(|v| column.sql_type.is_text() || !v.trim().is_empty());
            Ok(value.map(str::to_string))
        })
        .collect()
}
