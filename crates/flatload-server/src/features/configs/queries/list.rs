use std::sync::Arc;

use serde::Serialize;

use crate::db::{ConfigStore, DbError};
use crate::load::FileConfig;

/// Condensed view of an active configuration
#[derive(Debug, Clone, Serialize)]
pub struct ConfigListItem {
    pub id: Option<i64>,
    pub config_name: String,
    pub source_file_path: String,
    pub target_table_name: String,
    pub chunk_size: usize,
    pub column_count: usize,
}

impl From<&FileConfig> for ConfigListItem {
    fn from(config: &FileConfig) -> Self {
        Self {
            id: config.id,
            config_name: config.config_name.clone(),
            source_file_path: config.source_file_path.clone(),
            target_table_name: config.target_table_name.clone(),
            chunk_size: config.chunk_size,
            column_count: config.column_configs.len(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListConfigsError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

pub async fn handle(store: Arc<dyn ConfigStore>) -> Result<Vec<ConfigListItem>, ListConfigsError> {
    let configs = store.list_active().await?;
    Ok(configs.iter().map(ConfigListItem::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryConfigStore;
    use crate::load::ColumnConfig;

    #[tokio::test]
    async fn test_list_counts_columns() {
        let config = FileConfig::new("people", "/data/people.csv", "people")
            .with_column(ColumnConfig::new("id", "id", "INTEGER", 1))
            .with_column(ColumnConfig::new("name", "name", "STRING", 2));
        let store: Arc<dyn ConfigStore> =
            Arc::new(MemoryConfigStore::with_configs([config]).await.unwrap());

        let items = handle(store).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].config_name, "people");
        assert_eq!(items[0].column_count, 2);
    }
}
