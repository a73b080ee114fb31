//! In-memory destination
//!
//! Stores rows in process memory and enforces the same per-chunk atomicity
//! as the database: a chunk that fails leaves no rows behind. Used for dry
//! runs and tests, including injected commit failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::Mutex;

use super::{row_values, Destination};
use crate::load::analytics::{ColumnProfile, TableProfile};
use crate::load::error::DestinationError;
use crate::load::model::GenericDataRecord;
use crate::load::schema::TableSchema;

/// A stored row keyed by target column name
pub type MemoryRow = IndexMap<String, Option<String>>;

struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Vec<Option<String>>>,
    keys: HashSet<Vec<Option<String>>>,
}

#[derive(Default)]
pub struct MemoryDestination {
    tables: Mutex<HashMap<String, MemoryTable>>,
    creates: AtomicU64,
    commit_attempts: AtomicU64,
    fail_on_attempt: Option<u64>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `attempt`-th chunk insert (1-based) as a commit failure would
    pub fn failing_on_commit(attempt: u64) -> Self {
        Self {
            fail_on_attempt: Some(attempt),
            ..Self::default()
        }
    }

    /// Number of chunk inserts attempted so far
    pub fn commit_attempts(&self) -> u64 {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .await
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    /// Snapshot of a table's rows in insertion order
    pub async fn rows(&self, table: &str) -> Vec<MemoryRow> {
        let tables = self.tables.lock().await;
        let Some(t) = tables.get(table) else {
            return Vec::new();
        };
        t.rows
            .iter()
            .map(|row| {
                t.schema
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.target_name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }

    fn check_row(
        table: &MemoryTable,
        line: u64,
        row: &[Option<String>],
    ) -> Result<(), DestinationError> {
        for (column, value) in table.schema.columns.iter().zip(row) {
            match value {
                None if !column.nullable => {
                    return Err(DestinationError::Rejected {
                        line,
                        message: format!("null value in column {} violates not-null", column.target_name),
                    });
                }
                Some(v) if !column.sql_type.accepts(v) => {
                    return Err(DestinationError::Rejected {
                        line,
                        message: format!(
                            "value '{}' is not valid for column {} ({})",
                            v, column.target_name, column.sql_type
                        ),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn primary_key(table: &MemoryTable, row: &[Option<String>]) -> Option<Vec<Option<String>>> {
        let key: Vec<Option<String>> = table
            .schema
            .columns
            .iter()
            .zip(row)
            .filter(|(column, _)| column.primary_key)
            .map(|(_, value)| value.clone())
            .collect();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn table_exists(&self, table: &str) -> Result<bool, DestinationError> {
        Ok(self.tables.lock().await.contains_key(table))
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<(), DestinationError> {
        let mut tables = self.tables.lock().await;
        if !tables.contains_key(&schema.table_name) {
            tables.insert(
                schema.table_name.clone(),
                MemoryTable {
                    schema: schema.clone(),
                    rows: Vec::new(),
                    keys: HashSet::new(),
                },
            );
            self.creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn insert_chunk(
        &self,
        schema: &TableSchema,
        records: &[GenericDataRecord],
    ) -> Result<u64, DestinationError> {
        let attempt = self.commit_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_attempt == Some(attempt) {
            return Err(DestinationError::Injected(format!("commit attempt {}", attempt)));
        }

        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(&schema.table_name)
            .ok_or_else(|| DestinationError::MissingTable(schema.table_name.clone()))?;

        // Stage the whole chunk before touching the table.
        let mut staged = Vec::with_capacity(records.len());
        let mut staged_keys = HashSet::new();
        for record in records {
            let row = row_values(&table.schema, record)?;
            Self::check_row(table, record.line(), &row)?;
            if let Some(key) = Self::primary_key(table, &row) {
                if table.keys.contains(&key) || !staged_keys.insert(key) {
                    return Err(DestinationError::Rejected {
                        line: record.line(),
                        message: "duplicate primary key".to_string(),
                    });
                }
            }
            staged.push(row);
        }

        let inserted = staged.len() as u64;
        table.keys.extend(staged_keys);
        table.rows.extend(staged);
        Ok(inserted)
    }

    async fn profile_table(&self, schema: &TableSchema) -> Result<TableProfile, DestinationError> {
        let tables = self.tables.lock().await;
        let table = tables
            .get(&schema.table_name)
            .ok_or_else(|| DestinationError::MissingTable(schema.table_name.clone()))?;

        let columns = table
            .schema
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let values = table.rows.iter().map(|row| row[i].as_deref());
                let distinct: HashSet<&str> = values.clone().flatten().collect();
                ColumnProfile {
                    name: column.target_name.clone(),
                    sql_type: column.sql_type.to_string(),
                    null_count: values.clone().filter(Option::is_none).count() as u64,
                    empty_count: values.filter(|v| *v == Some("")).count() as u64,
                    distinct_count: distinct.len() as u64,
                }
            })
            .collect();

        Ok(TableProfile {
            table_name: schema.table_name.clone(),
            row_count: table.rows.len() as u64,
            columns,
            generated_at: Utc::now(),
        })
    }
}
