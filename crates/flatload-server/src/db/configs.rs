//! Load configuration store
//!
//! Configurations live in `file_configs` with their columns in
//! `column_configs`. Only active configurations are visible to lookups, and
//! a configuration name is unique among active rows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::sync::RwLock;

use super::{is_unique_violation, DbError, DbResult};
use crate::load::model::{ColumnConfig, FileConfig};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Active configuration by name, columns ordered by `column_order`
    async fn find_active(&self, name: &str) -> DbResult<Option<FileConfig>>;

    /// All active configurations, ordered by name
    async fn list_active(&self) -> DbResult<Vec<FileConfig>>;

    /// Store a new active configuration
    ///
    /// Fails with [`DbError::Duplicate`] when an active configuration with
    /// the same name exists.
    async fn create(&self, config: FileConfig) -> DbResult<FileConfig>;

    /// Deactivate by name; returns whether an active configuration existed
    async fn deactivate(&self, name: &str) -> DbResult<bool>;
}

const SELECT_WITH_COLUMNS: &str = r#"
    SELECT
        fc.id, fc.config_name, fc.source_file_path, fc.target_table_name,
        fc.delimiter, fc.has_header, fc.chunk_size, fc.is_active,
        fc.created_date, fc.updated_date,
        cc.id AS column_id, cc.source_column_name, cc.target_column_name,
        cc.data_type, cc.max_length, cc.is_nullable, cc.default_value,
        cc.column_order, cc.transformation_rule, cc.validation_rule,
        cc.is_primary_key
    FROM file_configs fc
    LEFT JOIN column_configs cc ON cc.file_config_id = fc.id
"#;

pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn config_from_row(row: &PgRow) -> Result<FileConfig, sqlx::Error> {
    let chunk_size: i32 = row.try_get("chunk_size")?;
    Ok(FileConfig {
        id: Some(row.try_get("id")?),
        config_name: row.try_get("config_name")?,
        source_file_path: row.try_get("source_file_path")?,
        target_table_name: row.try_get("target_table_name")?,
        delimiter: row.try_get("delimiter")?,
        has_header: row.try_get("has_header")?,
        chunk_size: usize::try_from(chunk_size).map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        is_active: row.try_get("is_active")?,
        created_date: row.try_get("created_date")?,
        updated_date: row.try_get("updated_date")?,
        column_configs: Vec::new(),
    })
}

fn column_from_row(row: &PgRow) -> Result<Option<ColumnConfig>, sqlx::Error> {
    let id: Option<i64> = row.try_get("column_id")?;
    if id.is_none() {
        return Ok(None);
    }

    Ok(Some(ColumnConfig {
        id,
        source_column_name: row.try_get("source_column_name")?,
        target_column_name: row.try_get("target_column_name")?,
        data_type: row.try_get("data_type")?,
        max_length: row.try_get("max_length")?,
        is_nullable: row.try_get("is_nullable")?,
        default_value: row.try_get("default_value")?,
        column_order: row.try_get("column_order")?,
        transformation_rule: row.try_get("transformation_rule")?,
        validation_rule: row.try_get("validation_rule")?,
        is_primary_key: row.try_get("is_primary_key")?,
    }))
}

/// Fold joined rows (ordered by config then column) into configurations
fn group_rows(rows: &[PgRow]) -> Result<Vec<FileConfig>, sqlx::Error> {
    let mut configs: Vec<FileConfig> = Vec::new();
    for row in rows {
        let id: i64 = row.try_get("id")?;
        if configs.last().and_then(|c| c.id) != Some(id) {
            configs.push(config_from_row(row)?);
        }
        if let (Some(column), Some(config)) = (column_from_row(row)?, configs.last_mut()) {
            config.column_configs.push(column);
        }
    }
    Ok(configs)
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    #[tracing::instrument(skip(self))]
    async fn find_active(&self, name: &str) -> DbResult<Option<FileConfig>> {
        let sql = format!(
            "{} WHERE fc.config_name = $1 AND fc.is_active ORDER BY cc.column_order",
            SELECT_WITH_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(name).fetch_all(&self.pool).await?;
        Ok(group_rows(&rows)?.into_iter().next())
    }

    async fn list_active(&self) -> DbResult<Vec<FileConfig>> {
        let sql = format!(
            "{} WHERE fc.is_active ORDER BY fc.config_name, fc.id, cc.column_order",
            SELECT_WITH_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(group_rows(&rows)?)
    }

    #[tracing::instrument(skip(self, config), fields(name = %config.config_name))]
    async fn create(&self, mut config: FileConfig) -> DbResult<FileConfig> {
        config.sort_columns();
        let chunk_size = i32::try_from(config.chunk_size)
            .map_err(|_| DbError::config(format!("chunk_size {} is too large", config.chunk_size)))?;

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO file_configs (
                config_name, source_file_path, target_table_name,
                delimiter, has_header, chunk_size, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, TRUE)
            RETURNING id, created_date, updated_date
            "#,
        )
        .bind(&config.config_name)
        .bind(&config.source_file_path)
        .bind(&config.target_table_name)
        .bind(&config.delimiter)
        .bind(config.has_header)
        .bind(chunk_size)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DbError::duplicate("Configuration", &config.config_name)
            } else {
                DbError::from(e)
            }
        })?;

        let config_id: i64 = row.try_get("id")?;
        config.id = Some(config_id);
        config.is_active = true;
        config.created_date = Some(row.try_get("created_date")?);
        config.updated_date = Some(row.try_get("updated_date")?);

        if !config.column_configs.is_empty() {
            let ids: Vec<i64> = {
                let mut query_builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                    r#"
                    INSERT INTO column_configs (
                        file_config_id, source_column_name, target_column_name,
                        data_type, max_length, is_nullable, default_value,
                        column_order, transformation_rule, validation_rule,
                        is_primary_key
                    )
                    "#,
                );

                query_builder.push_values(&config.column_configs, |mut b, column| {
                    b.push_bind(config_id)
                        .push_bind(&column.source_column_name)
                        .push_bind(&column.target_column_name)
                        .push_bind(&column.data_type)
                        .push_bind(column.max_length)
                        .push_bind(column.is_nullable)
                        .push_bind(&column.default_value)
                        .push_bind(column.column_order)
                        .push_bind(&column.transformation_rule)
                        .push_bind(&column.validation_rule)
                        .push_bind(column.is_primary_key);
                });
                query_builder.push(" RETURNING id");

                query_builder
                    .build_query_scalar::<i64>()
                    .fetch_all(&mut *tx)
                    .await?
            };

            for (column, id) in config.column_configs.iter_mut().zip(ids) {
                column.id = Some(id);
            }
        }

        tx.commit().await?;

        tracing::info!(id = config_id, "Configuration created");
        Ok(config)
    }

    #[tracing::instrument(skip(self))]
    async fn deactivate(&self, name: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE file_configs
            SET is_active = FALSE, updated_date = NOW()
            WHERE config_name = $1 AND is_active
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Configuration store held in process memory
#[derive(Default)]
pub struct MemoryConfigStore {
    configs: RwLock<HashMap<String, FileConfig>>,
    next_id: AtomicI64,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store preloaded with `configs`; duplicates are rejected
    pub async fn with_configs(configs: impl IntoIterator<Item = FileConfig>) -> DbResult<Self> {
        let store = Self::new();
        for config in configs {
            store.create(config).await?;
        }
        Ok(store)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn find_active(&self, name: &str) -> DbResult<Option<FileConfig>> {
        Ok(self.configs.read().await.get(name).cloned())
    }

    async fn list_active(&self) -> DbResult<Vec<FileConfig>> {
        let mut configs: Vec<FileConfig> = self.configs.read().await.values().cloned().collect();
        configs.sort_by(|a, b| a.config_name.cmp(&b.config_name));
        Ok(configs)
    }

    async fn create(&self, mut config: FileConfig) -> DbResult<FileConfig> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(&config.config_name) {
            return Err(DbError::duplicate("Configuration", &config.config_name));
        }

        config.sort_columns();
        config.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        config.is_active = true;
        let now = Utc::now();
        config.created_date = Some(now);
        config.updated_date = Some(now);
        for column in &mut config.column_configs {
            column.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        }

        configs.insert(config.config_name.clone(), config.clone());
        Ok(config)
    }

    async fn deactivate(&self, name: &str) -> DbResult<bool> {
        Ok(self.configs.write().await.remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> FileConfig {
        FileConfig::new(name, "/data/in.csv", "target")
            .with_column(ColumnConfig::new("b", "b", "STRING", 2))
            .with_column(ColumnConfig::new("a", "a", "STRING", 1))
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryConfigStore::new();

        let created = store.create(config("employees")).await.unwrap();
        assert!(created.id.is_some());
        assert_eq!(created.column_configs[0].source_column_name, "a");

        let found = store.find_active("employees").await.unwrap().unwrap();
        assert_eq!(found, created);

        assert!(matches!(
            store.create(config("employees")).await,
            Err(DbError::Duplicate(_))
        ));

        assert!(store.deactivate("employees").await.unwrap());
        assert!(!store.deactivate("employees").await.unwrap());
        assert!(store.find_active("employees").await.unwrap().is_none());

        // The name is free again once the old configuration is inactive.
        assert!(store.create(config("employees")).await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_store_lists_by_name() {
        let store = MemoryConfigStore::with_configs([config("zeta"), config("alpha")])
            .await
            .unwrap();

        let names: Vec<_> = store
            .list_active()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.config_name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
