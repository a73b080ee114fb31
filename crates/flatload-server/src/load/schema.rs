//! Target table resolution and provisioning
//!
//! A [`FileConfig`] is resolved into a [`TableSchema`] by mapping each
//! column's semantic type tag onto a PostgreSQL storage type. Provisioning
//! creates the table when it does not exist and never alters an existing one.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use flatload_common::identifiers::quote_identifier;
use serde::Serialize;
use tracing::info;

use super::destination::Destination;
use super::error::LoadError;
use super::model::FileConfig;
use super::rules::parse_decimal;

/// Concrete storage type of a target column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SqlType {
    Varchar(i32),
    Text,
    Char(i32),
    Numeric,
    Integer,
    BigInt,
    DoublePrecision,
    Boolean,
    Date,
    Timestamp,
}

impl SqlType {
    /// Map a semantic type tag (case-insensitive) to a storage type
    pub fn resolve(data_type: &str, max_length: Option<i32>) -> Option<Self> {
        let ty = match data_type.trim().to_uppercase().as_str() {
            "STRING" | "VARCHAR" | "VARCHAR2" | "NVARCHAR2" | "TEXT" => match max_length {
                Some(n) if n > 0 => SqlType::Varchar(n),
                _ => SqlType::Text,
            },
            "CHAR" => SqlType::Char(max_length.filter(|n| *n > 0).unwrap_or(1)),
            "NUMBER" | "NUMERIC" | "DECIMAL" => SqlType::Numeric,
            "INTEGER" | "INT" => SqlType::Integer,
            "BIGINT" | "LONG" => SqlType::BigInt,
            "FLOAT" | "DOUBLE" => SqlType::DoublePrecision,
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "DATE" => SqlType::Date,
            "TIMESTAMP" | "DATETIME" => SqlType::Timestamp,
            _ => return None,
        };
        Some(ty)
    }

    /// Whether the column holds character data
    pub fn is_text(&self) -> bool {
        matches!(self, SqlType::Varchar(_) | SqlType::Text | SqlType::Char(_))
    }

    /// Type a bound value is cast to before insertion
    ///
    /// Character data is cast to unbounded `TEXT` so the column's own
    /// length limit rejects an over-long value. An explicit cast to
    /// `VARCHAR(n)` would truncate it instead.
    pub fn bind_type(&self) -> SqlType {
        if self.is_text() {
            SqlType::Text
        } else {
            *self
        }
    }

    /// Whether PostgreSQL would accept `value` when cast to this type
    ///
    /// Covers the common literal forms only; the database remains the
    /// authority for real loads.
    pub fn accepts(&self, value: &str) -> bool {
        let trimmed = value.trim();
        match self {
            SqlType::Varchar(n) | SqlType::Char(n) => value.chars().count() <= *n as usize,
            SqlType::Text => true,
            SqlType::Numeric => parse_decimal(trimmed).is_some(),
            SqlType::Integer => trimmed.parse::<i32>().is_ok(),
            SqlType::BigInt => trimmed.parse::<i64>().is_ok(),
            SqlType::DoublePrecision => trimmed.parse::<f64>().is_ok(),
            SqlType::Boolean => matches!(
                trimmed.to_lowercase().as_str(),
                "t" | "true" | "y" | "yes" | "on" | "1" | "f" | "false" | "n" | "no" | "off" | "0"
            ),
            SqlType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok(),
            SqlType::Timestamp => ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .any(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).is_ok())
                || NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok(),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Varchar(n) => write!(f, "VARCHAR({})", n),
            SqlType::Text => f.write_str("TEXT"),
            SqlType::Char(n) => write!(f, "CHAR({})", n),
            SqlType::Numeric => f.write_str("NUMERIC"),
            SqlType::Integer => f.write_str("INTEGER"),
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::DoublePrecision => f.write_str("DOUBLE PRECISION"),
            SqlType::Boolean => f.write_str("BOOLEAN"),
            SqlType::Date => f.write_str("DATE"),
            SqlType::Timestamp => f.write_str("TIMESTAMP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSchema {
    /// Key of the value in a record
    pub source_name: String,
    /// Column name in the target table
    pub target_name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary_key: bool,
}

/// Resolved layout of a target table, columns in load order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Resolve the target table of a configuration
    ///
    /// Fails with [`LoadError::UnknownDataType`] on an unmapped type tag and
    /// with [`LoadError::InvalidConfiguration`] on an unusable identifier.
    pub fn from_config(config: &FileConfig) -> Result<Self, LoadError> {
        quote_identifier(&config.target_table_name)?;

        let columns = config
            .ordered_columns()
            .into_iter()
            .map(|column| -> Result<ColumnSchema, LoadError> {
                quote_identifier(&column.target_column_name)?;
                let sql_type = SqlType::resolve(&column.data_type, column.max_length).ok_or_else(
                    || LoadError::UnknownDataType {
                        column: column.source_column_name.clone(),
                        data_type: column.data_type.clone(),
                    },
                )?;
                Ok(ColumnSchema {
                    source_name: column.source_column_name.clone(),
                    target_name: column.target_column_name.clone(),
                    sql_type,
                    nullable: column.is_nullable && !column.is_primary_key,
                    primary_key: column.is_primary_key,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        Ok(Self {
            table_name: config.target_table_name.clone(),
            columns,
        })
    }

    pub fn quoted_table(&self) -> Result<String, LoadError> {
        Ok(quote_identifier(&self.table_name)?)
    }

    /// Quoted target column names, in load order
    pub fn quoted_columns(&self) -> Result<Vec<String>, LoadError> {
        self.columns
            .iter()
            .map(|c| quote_identifier(&c.target_name).map_err(LoadError::from))
            .collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this schema
    pub fn create_table_sql(&self) -> Result<String, LoadError> {
        let mut definitions = Vec::with_capacity(self.columns.len() + 1);
        for (column, quoted) in self.columns.iter().zip(self.quoted_columns()?) {
            let mut def = format!("{} {}", quoted, column.sql_type);
            if !column.nullable {
                def.push_str(" NOT NULL");
            }
            definitions.push(def);
        }

        let keys: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| quote_identifier(&c.target_name).map_err(LoadError::from))
            .collect::<Result<_, _>>()?;
        if !keys.is_empty() {
            definitions.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quoted_table()?,
            definitions.join(", ")
        ))
    }
}

/// Ensures the target table exists before any row is written
pub struct SchemaProvisioner {
    destination: Arc<dyn Destination>,
}

impl SchemaProvisioner {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Self { destination }
    }

    /// Create the table if absent; returns whether it was created
    pub async fn provision(&self, schema: &TableSchema) -> Result<bool, LoadError> {
        let provisioning = |source| LoadError::Provisioning {
            table: schema.table_name.clone(),
            source,
        };

        if self
            .destination
            .table_exists(&schema.table_name)
            .await
            .map_err(provisioning)?
        {
            info!(table = %schema.table_name, "Target table exists, leaving it unchanged");
            return Ok(false);
        }

        self.destination
            .create_table(schema)
            .await
            .map_err(provisioning)?;
        info!(
            table = %schema.table_name,
            columns = schema.columns.len(),
            "Created target table"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::destination::MemoryDestination;
    use crate::load::model::ColumnConfig;

    #[test]
    fn test_type_mapping() {
        let cases = [
            ("STRING", Some(50), "VARCHAR(50)"),
            ("varchar2", None, "TEXT"),
            ("NVARCHAR2", Some(10), "VARCHAR(10)"),
            ("text", None, "TEXT"),
            ("CHAR", None, "CHAR(1)"),
            ("CHAR", Some(3), "CHAR(3)"),
            ("NUMBER", Some(10), "NUMERIC"),
            ("decimal", None, "NUMERIC"),
            ("INT", None, "INTEGER"),
            ("LONG", None, "BIGINT"),
            ("DOUBLE", None, "DOUBLE PRECISION"),
            ("FLOAT", None, "DOUBLE PRECISION"),
            ("BOOL", None, "BOOLEAN"),
            ("DATE", None, "DATE"),
            ("DATETIME", None, "TIMESTAMP"),
        ];
        for (tag, len, expected) in cases {
            let ty = SqlType::resolve(tag, len).unwrap();
            assert_eq!(ty.to_string(), expected, "tag {tag}");
        }
        assert!(SqlType::resolve("BLOB", None).is_none());
    }

    #[test]
    fn test_accepts() {
        assert!(SqlType::Numeric.accepts("-1.25"));
        assert!(!SqlType::Integer.accepts("1.5"));
        assert!(SqlType::Varchar(3).accepts("abc"));
        assert!(!SqlType::Varchar(3).accepts("abcd"));
        assert!(SqlType::Date.accepts("2024-02-29"));
        assert!(!SqlType::Date.accepts("2023-02-29"));
        assert!(SqlType::Timestamp.accepts("2024-01-01 10:00:00"));
        assert!(SqlType::Boolean.accepts("TRUE"));
        assert!(!SqlType::Boolean.accepts("maybe"));
        assert!(!SqlType::Numeric.accepts("1_000"));
    }

    #[test]
    fn test_text_values_bind_unbounded() {
        assert_eq!(SqlType::Varchar(3).bind_type(), SqlType::Text);
        assert_eq!(SqlType::Char(2).bind_type(), SqlType::Text);
        assert_eq!(SqlType::Text.bind_type(), SqlType::Text);
        assert_eq!(SqlType::Numeric.bind_type(), SqlType::Numeric);
        assert_eq!(SqlType::Date.bind_type().to_string(), "DATE");
        assert!(!SqlType::Integer.is_text());
    }

    fn config() -> FileConfig {
        FileConfig::new("employees", "unused", "employees")
            .with_column(ColumnConfig::new("emp_name", "name", "STRING", 2).with_max_length(100).not_null())
            .with_column(ColumnConfig::new("emp_id", "id", "NUMBER", 1).primary_key())
            .with_column(ColumnConfig::new("hired", "hired_on", "DATE", 3))
    }

    #[test]
    fn test_create_table_sql() {
        let schema = TableSchema::from_config(&config()).unwrap();
        assert_eq!(
            schema.create_table_sql().unwrap(),
            "CREATE TABLE IF NOT EXISTS \"employees\" (\"id\" NUMERIC NOT NULL, \
             \"name\" VARCHAR(100) NOT NULL, \"hired_on\" DATE, PRIMARY KEY (\"id\"))"
        );
        assert_eq!(schema.columns[0].source_name, "emp_id");
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let cfg = config().with_column(ColumnConfig::new("photo", "photo", "BLOB", 4));
        let err = TableSchema::from_config(&cfg).unwrap_err();
        assert!(matches!(err, LoadError::UnknownDataType { ref data_type, .. } if data_type == "BLOB"));
    }

    #[test]
    fn test_bad_identifier_is_rejected() {
        let cfg = FileConfig::new("x", "unused", "employees; drop table users")
            .with_column(ColumnConfig::new("a", "a", "STRING", 1));
        assert!(matches!(
            TableSchema::from_config(&cfg),
            Err(LoadError::InvalidConfiguration(_))
        ));

        let cfg = FileConfig::new("x", "unused", "ok")
            .with_column(ColumnConfig::new("a", "1bad", "STRING", 1));
        assert!(TableSchema::from_config(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_provisioning_is_idempotent() {
        let destination = Arc::new(MemoryDestination::new());
        let provisioner = SchemaProvisioner::new(destination.clone());
        let schema = TableSchema::from_config(&config()).unwrap();

        assert!(provisioner.provision(&schema).await.unwrap());
        assert!(!provisioner.provision(&schema).await.unwrap());
        assert_eq!(destination.create_count(), 1);
    }
}
