//! Load configuration model and the per-row record carrier

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::error::LoadError;

/// Default field delimiter
pub const DEFAULT_DELIMITER: &str = ",";

/// Default number of accepted records committed per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 100;

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

/// A named load job: where to read, how to split, and where to write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub id: Option<i64>,
    /// Unique among active configurations
    pub config_name: String,
    pub source_file_path: String,
    pub target_table_name: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_true")]
    pub has_header: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub column_configs: Vec<ColumnConfig>,
}

impl FileConfig {
    pub fn new(
        config_name: impl Into<String>,
        source_file_path: impl Into<String>,
        target_table_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            config_name: config_name.into(),
            source_file_path: source_file_path.into(),
            target_table_name: target_table_name.into(),
            delimiter: default_delimiter(),
            has_header: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            is_active: true,
            created_date: None,
            updated_date: None,
            column_configs: Vec::new(),
        }
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_column(mut self, column: ColumnConfig) -> Self {
        self.column_configs.push(column);
        self
    }

    /// Columns in ascending `column_order`
    ///
    /// This order is both the physical field order in the source file and the
    /// column order of the target table.
    pub fn ordered_columns(&self) -> Vec<&ColumnConfig> {
        let mut columns: Vec<&ColumnConfig> = self.column_configs.iter().collect();
        columns.sort_by_key(|c| c.column_order);
        columns
    }

    /// Sort the owned column list by `column_order` in place
    pub fn sort_columns(&mut self) {
        self.column_configs.sort_by_key(|c| c.column_order);
    }

    /// Check the structural invariants a load relies on
    pub fn validate(&self) -> Result<(), LoadError> {
        let invalid = |msg: String| Err(LoadError::InvalidConfiguration(msg));

        if self.config_name.trim().is_empty() {
            return invalid("config_name is required".to_string());
        }
        if self.source_file_path.trim().is_empty() {
            return invalid(format!("{}: source_file_path is required", self.config_name));
        }
        if self.target_table_name.trim().is_empty() {
            return invalid(format!("{}: target_table_name is required", self.config_name));
        }
        if self.delimiter.is_empty() {
            return invalid(format!("{}: delimiter must not be empty", self.config_name));
        }
        if self.chunk_size == 0 {
            return invalid(format!("{}: chunk_size must be at least 1", self.config_name));
        }
        if self.column_configs.is_empty() {
            return invalid(format!("{}: at least one column is required", self.config_name));
        }

        let mut orders = HashSet::new();
        let mut sources = HashSet::new();
        let mut targets = HashSet::new();
        for column in &self.column_configs {
            column.validate()?;
            if !orders.insert(column.column_order) {
                return invalid(format!(
                    "{}: duplicate column_order {}",
                    self.config_name, column.column_order
                ));
            }
            if !sources.insert(column.source_column_name.as_str()) {
                return invalid(format!(
                    "{}: duplicate source column {}",
                    self.config_name, column.source_column_name
                ));
            }
            if !targets.insert(column.target_column_name.to_lowercase()) {
                return invalid(format!(
                    "{}: duplicate target column {}",
                    self.config_name, column.target_column_name
                ));
            }
        }

        Ok(())
    }
}

/// One column of a [`FileConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfig {
    #[serde(default)]
    pub id: Option<i64>,
    pub source_column_name: String,
    pub target_column_name: String,
    /// Semantic type tag (STRING, NUMBER, DATE, TIMESTAMP, ...)
    pub data_type: String,
    #[serde(default)]
    pub max_length: Option<i32>,
    #[serde(default = "default_true")]
    pub is_nullable: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    pub column_order: i32,
    #[serde(default)]
    pub transformation_rule: Option<String>,
    #[serde(default)]
    pub validation_rule: Option<String>,
    #[serde(default)]
    pub is_primary_key: bool,
}

impl ColumnConfig {
    pub fn new(
        source_column_name: impl Into<String>,
        target_column_name: impl Into<String>,
        data_type: impl Into<String>,
        column_order: i32,
    ) -> Self {
        Self {
            id: None,
            source_column_name: source_column_name.into(),
            target_column_name: target_column_name.into(),
            data_type: data_type.into(),
            max_length: None,
            is_nullable: true,
            default_value: None,
            column_order,
            transformation_rule: None,
            validation_rule: None,
            is_primary_key: false,
        }
    }

    pub fn with_validation(mut self, rule: impl Into<String>) -> Self {
        self.validation_rule = Some(rule.into());
        self
    }

    pub fn with_transformation(mut self, rule: impl Into<String>) -> Self {
        self.transformation_rule = Some(rule.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_max_length(mut self, max_length: i32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    fn validate(&self) -> Result<(), LoadError> {
        if self.source_column_name.trim().is_empty() || self.target_column_name.trim().is_empty() {
            return Err(LoadError::InvalidConfiguration(format!(
                "column {} needs both a source and a target name",
                self.column_order
            )));
        }
        if self.data_type.trim().is_empty() {
            return Err(LoadError::InvalidConfiguration(format!(
                "column {} has no data_type",
                self.source_column_name
            )));
        }
        if matches!(self.max_length, Some(n) if n < 1) {
            return Err(LoadError::InvalidConfiguration(format!(
                "column {}: max_length must be positive",
                self.source_column_name
            )));
        }
        Ok(())
    }
}

/// One source line on its way to the target table
///
/// Values are keyed by source column name, in column order. `None` is a null
/// value. The record moves reader -> processor -> writer and is dropped after
/// its chunk commits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenericDataRecord {
    table_name: String,
    line: u64,
    values: IndexMap<String, Option<String>>,
}

impl GenericDataRecord {
    pub fn new(table_name: impl Into<String>, line: u64) -> Self {
        Self {
            table_name: table_name.into(),
            line,
            values: IndexMap::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// 1-based line number in the source file
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Set or overwrite a column value, keeping the original position
    pub fn set_value(&mut self, column: impl Into<String>, value: Option<String>) {
        self.values.insert(column.into(), value);
    }

    /// Current value; `None` for both null and absent columns
    pub fn value(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(|v| v.as_deref())
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FileConfig {
        FileConfig::new("employees", "/data/employees.csv", "employees")
            .with_column(ColumnConfig::new("name", "name", "STRING", 2))
            .with_column(ColumnConfig::new("id", "id", "NUMBER", 1))
    }

    #[test]
    fn test_defaults() {
        let cfg = FileConfig::new("a", "b", "c");
        assert_eq!(cfg.delimiter, ",");
        assert!(cfg.has_header);
        assert_eq!(cfg.chunk_size, 100);
        assert!(cfg.is_active);
    }

    #[test]
    fn test_ordered_columns() {
        let cfg = config();
        let names: Vec<_> = cfg
            .ordered_columns()
            .iter()
            .map(|c| c.source_column_name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn test_validate_ok() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let cases = vec![
            config().with_delimiter(""),
            config().with_chunk_size(0),
            FileConfig::new("x", "y", "z"),
            config().with_column(ColumnConfig::new("dup", "dup", "STRING", 1)),
            config().with_column(ColumnConfig::new("name", "other", "STRING", 3)),
            config().with_column(ColumnConfig::new("other", "NAME", "STRING", 3)),
            config().with_column(ColumnConfig::new("z", "z", "STRING", 3).with_max_length(0)),
        ];

        for cfg in cases {
            assert!(
                matches!(cfg.validate(), Err(LoadError::InvalidConfiguration(_))),
                "{:?} should be invalid",
                cfg
            );
        }
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let json = r#"{
            "config_name": "employees",
            "source_file_path": "/tmp/e.csv",
            "target_table_name": "employees",
            "column_configs": [
                {"source_column_name": "id", "target_column_name": "id",
                 "data_type": "NUMBER", "column_order": 1}
            ]
        }"#;
        let cfg: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.delimiter, ",");
        assert_eq!(cfg.chunk_size, 100);
        assert!(cfg.column_configs[0].is_nullable);
        assert!(!cfg.column_configs[0].is_primary_key);
    }

    #[test]
    fn test_record_keeps_insertion_order() {
        let mut record = GenericDataRecord::new("t", 2);
        record.set_value("b", Some("2".to_string()));
        record.set_value("a", None);
        record.set_value("b", Some("3".to_string()));

        let cols: Vec<_> = record.columns().collect();
        assert_eq!(cols, vec![("b", Some("3")), ("a", None)]);
        assert_eq!(record.value("a"), None);
        assert!(record.has_column("a"));
        assert!(!record.has_column("c"));
        assert_eq!(record.line(), 2);
    }
}
