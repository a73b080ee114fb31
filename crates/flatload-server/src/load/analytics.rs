//! Post-load analytics
//!
//! After a load completes, the analytics collaborator profiles the target
//! table and writes the result under `<analytics_dir>/<table>/`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::destination::Destination;
use super::error::DestinationError;
use super::schema::TableSchema;

pub const PROFILE_FILE_NAME: &str = "profile.json";

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Failed to read table: {0}")]
    Destination(#[from] DestinationError),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize profile: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub sql_type: String,
    pub null_count: u64,
    pub empty_count: u64,
    pub distinct_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProfile {
    pub table_name: String,
    pub row_count: u64,
    pub columns: Vec<ColumnProfile>,
    pub generated_at: DateTime<Utc>,
}

/// Work that runs once after a successful load
#[async_trait]
pub trait PostLoadAnalytics: Send + Sync {
    /// Analyze `schema`'s table, writing output below `output_root`
    ///
    /// Returns the directory the output was written to.
    async fn analyze(&self, schema: &TableSchema, output_root: &Path)
        -> Result<PathBuf, AnalyticsError>;
}

/// Writes per-column null, empty and distinct counts as JSON
pub struct TableProfiler {
    destination: Arc<dyn Destination>,
}

impl TableProfiler {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Self { destination }
    }
}

#[async_trait]
impl PostLoadAnalytics for TableProfiler {
    async fn analyze(
        &self,
        schema: &TableSchema,
        output_root: &Path,
    ) -> Result<PathBuf, AnalyticsError> {
        let profile = self.destination.profile_table(schema).await?;

        let dir = output_root.join(&schema.table_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| AnalyticsError::Io { path: dir.clone(), source })?;

        let path = dir.join(PROFILE_FILE_NAME);
        let json = serde_json::to_vec_pretty(&profile)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|source| AnalyticsError::Io { path: path.clone(), source })?;

        info!(
            table = %schema.table_name,
            rows = profile.row_count,
            path = %path.display(),
            "Wrote table profile"
        );
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::destination::MemoryDestination;
    use crate::load::model::{ColumnConfig, FileConfig, GenericDataRecord};

    #[tokio::test]
    async fn test_profile_written_per_table() {
        let config = FileConfig::new("c", "unused", "cities")
            .with_column(ColumnConfig::new("name", "name", "STRING", 1))
            .with_column(ColumnConfig::new("country", "country", "STRING", 2));
        let schema = TableSchema::from_config(&config).unwrap();

        let destination = Arc::new(MemoryDestination::new());
        destination.create_table(&schema).await.unwrap();
        let rows: Vec<GenericDataRecord> = [("Oslo", Some("NO")), ("Bergen", Some("NO")), ("Lima", None)]
            .iter()
            .enumerate()
            .map(|(i, (name, country))| {
                let mut record = GenericDataRecord::new("cities", i as u64 + 1);
                record.set_value("name", Some(name.to_string()));
                record.set_value("country", country.map(str::to_string));
                record
            })
            .collect();
        destination.insert_chunk(&schema, &rows).await.unwrap();

        let out = tempfile::tempdir().unwrap();
        let dir = TableProfiler::new(destination)
            .analyze(&schema, out.path())
            .await
            .unwrap();

        assert_eq!(dir, out.path().join("cities"));
        let written = std::fs::read_to_string(dir.join(PROFILE_FILE_NAME)).unwrap();
        let profile: TableProfile = serde_json::from_str(&written).unwrap();
        assert_eq!(profile.row_count, 3);
        assert_eq!(profile.columns[1].name, "country");
        assert_eq!(profile.columns[1].null_count, 1);
        assert_eq!(profile.columns[1].distinct_count, 1);
        assert_eq!(profile.columns[0].distinct_count, 3);
    }
}
