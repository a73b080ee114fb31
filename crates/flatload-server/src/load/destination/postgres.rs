//! PostgreSQL destination

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::debug;

use super::{row_values, Destination};
use crate::load::analytics::{ColumnProfile, TableProfile};
use crate::load::error::{DestinationError, LoadError};
use crate::load::model::GenericDataRecord;
use crate::load::schema::TableSchema;

/// Upper bound on bind parameters in one PostgreSQL statement
pub const MAX_BIND_PARAMS: usize = 65_535;

#[derive(Clone)]
pub struct PgDestination {
    pool: PgPool,
}

impl PgDestination {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Rows that fit in one statement for a table of `columns` columns
    fn rows_per_statement(columns: usize) -> usize {
        (MAX_BIND_PARAMS / columns.max(1)).max(1)
    }

    async fn insert_rows(
        tx: &mut Transaction<'_, Postgres>,
        schema: &TableSchema,
        table: &str,
        columns: &str,
        rows: &[Vec<Option<String>>],
    ) -> Result<u64, DestinationError> {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, columns));

        query_builder.push_values(rows, |mut b, row| {
            for (value, column) in row.iter().zip(&schema.columns) {
                b.push("CAST(")
                    .push_bind_unseparated(value.clone())
                    .push_unseparated(format!(" AS {})", column.sql_type.bind_type()));
            }
        });

        let result = query_builder.build().execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

fn sql_identifiers(schema: &TableSchema) -> Result<(String, String), DestinationError> {
    let quote = |e: LoadError| DestinationError::InvalidSchema(e.to_string());
    let table = schema.quoted_table().map_err(quote)?;
    let columns = schema.quoted_columns().map_err(quote)?.join(", ");
    Ok((table, columns))
}

#[async_trait]
impl Destination for PgDestination {
    async fn table_exists(&self, table: &str) -> Result<bool, DestinationError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_table(&self, schema: &TableSchema) -> Result<(), DestinationError> {
        let ddl = schema
            .create_table_sql()
            .map_err(|e| DestinationError::InvalidSchema(e.to_string()))?;
        debug!(sql = %ddl, "Creating target table");
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_chunk(
        &self,
        schema: &TableSchema,
        records: &[GenericDataRecord],
    ) -> Result<u64, DestinationError> {
        if records.is_empty() {
            return Ok(0);
        }

        let rows = records
            .iter()
            .map(|record| row_values(schema, record))
            .collect::<Result<Vec<_>, _>>()?;
        let (table, columns) = sql_identifiers(schema)?;

        // Dropping the transaction without commit rolls the chunk back.
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for slice in rows.chunks(Self::rows_per_statement(schema.columns.len())) {
            inserted += Self::insert_rows(&mut tx, schema, &table, &columns, slice).await?;
        }
        tx.commit().await?;

        Ok(inserted)
    }

    async fn profile_table(&self, schema: &TableSchema) -> Result<TableProfile, DestinationError> {
        let (table, _) = sql_identifiers(schema)?;
        let quoted = schema
            .quoted_columns()
            .map_err(|e| DestinationError::InvalidSchema(e.to_string()))?;

        let mut select = vec!["COUNT(*)".to_string()];
        for column in &quoted {
            select.push(format!("COUNT(*) - COUNT({})", column));
            select.push(format!(
                "COALESCE(SUM(CASE WHEN CAST({} AS TEXT) = '' THEN 1 ELSE 0 END), 0)::BIGINT",
                column
            ));
            select.push(format!("COUNT(DISTINCT {})", column));
        }
        let sql = format!("SELECT {} FROM {}", select.join(", "), table);

        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let count = |idx: usize| -> Result<u64, DestinationError> {
            Ok(row.try_get::<i64, _>(idx)?.max(0) as u64)
        };

        let mut columns = Vec::with_capacity(schema.columns.len());
        for (i, column) in schema.columns.iter().enumerate() {
            let base = 1 + i * 3;
            columns.push(ColumnProfile {
                name: column.target_name.clone(),
                sql_type: column.sql_type.to_string(),
                null_count: count(base)?,
                empty_count: count(base + 1)?,
                distinct_count: count(base + 2)?,
            });
        }

        Ok(TableProfile {
            table_name: schema.table_name.clone(),
            row_count: count(0)?,
            columns,
            generated_at: Utc::now(),
        })
    }
}
