//! Per-record rule application

use std::sync::Arc;

use tracing::warn;

use super::error::LoadError;
use super::model::{FileConfig, GenericDataRecord};
use super::rules::RuleRegistry;

/// Result of running one record through the processor
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// All columns validated; values have been transformed in place
    Accepted(GenericDataRecord),
    /// A column failed its validation rule; the record is skipped
    Rejected {
        line: u64,
        column: String,
        value: Option<String>,
        rule: String,
    },
    /// No configuration is bound, so nothing could be checked
    Unconfigured,
}

/// Applies each column's validation and transformation rules
pub struct RecordProcessor {
    config: Option<Arc<FileConfig>>,
    rules: Arc<RuleRegistry>,
}

impl RecordProcessor {
    pub fn new(config: Arc<FileConfig>, rules: Arc<RuleRegistry>) -> Self {
        Self { config: Some(config), rules }
    }

    /// A processor with no configuration bound
    pub fn unbound(rules: Arc<RuleRegistry>) -> Self {
        Self { config: None, rules }
    }

    /// Compile every pattern rule in the bound configuration
    ///
    /// Lets a run fail on a malformed pattern before anything is written.
    pub fn check_rules(&self) -> Result<(), LoadError> {
        let Some(config) = &self.config else {
            return Ok(());
        };

        for column in &config.column_configs {
            if let Some(rule) = column.validation_rule.as_deref().filter(|r| !r.trim().is_empty()) {
                self.rules.check_pattern(rule).map_err(|e| LoadError::InvalidRule {
                    column: column.source_column_name.clone(),
                    rule: rule.to_string(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Validate then transform every configured column, in column order
    ///
    /// The first failing column rejects the whole record.
    pub fn process(&self, mut record: GenericDataRecord) -> Result<ProcessOutcome, LoadError> {
        let Some(config) = &self.config else {
            return Ok(ProcessOutcome::Unconfigured);
        };

        for column in config.ordered_columns() {
            let name = column.source_column_name.as_str();
            let value = record.value(name);
            let rule = column.validation_rule.as_deref();

            let valid = self
                .rules
                .validate(rule, value)
                .map_err(|e| LoadError::InvalidRule {
                    column: name.to_string(),
                    rule: rule.unwrap_or_default().to_string(),
                    reason: e.to_string(),
                })?;

            if !valid {
                warn!(
                    line = record.line(),
                    column = name,
                    value = value.unwrap_or(""),
                    rule = rule.unwrap_or_default(),
                    "Record failed validation, skipping"
                );
                return Ok(ProcessOutcome::Rejected {
                    line: record.line(),
                    column: name.to_string(),
                    value: value.map(str::to_string),
                    rule: rule.unwrap_or_default().to_string(),
                });
            }

            let transformed = self.rules.transform(
                column.transformation_rule.as_deref(),
                value,
                column.default_value.as_deref(),
            );
            record.set_value(name, transformed);
        }

        Ok(ProcessOutcome::Accepted(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::model::ColumnConfig;

    fn processor() -> RecordProcessor {
        let config = FileConfig::new("employees", "unused", "employees")
            .with_column(ColumnConfig::new("id", "id", "NUMBER", 1).with_validation("NUMERIC"))
            .with_column(
                ColumnConfig::new("name", "name", "STRING", 2)
                    .with_validation("NOT_NULL")
                    .with_transformation("UPPER"),
            )
            .with_column(
                ColumnConfig::new("email", "email", "STRING", 3)
                    .with_validation("EMAIL")
                    .with_transformation("LOWER"),
            )
            .with_column(ColumnConfig::new("dept", "dept", "STRING", 4).with_default("GENERAL"));
        RecordProcessor::new(Arc::new(config), Arc::new(RuleRegistry::default()))
    }

    fn record(id: &str, name: &str, email: &str, dept: Option<&str>) -> GenericDataRecord {
        let mut record = GenericDataRecord::new("employees", 2);
        record.set_value("id", Some(id.to_string()));
        record.set_value("name", Some(name.to_string()));
        record.set_value("email", Some(email.to_string()));
        record.set_value("dept", dept.map(str::to_string));
        record
    }

    #[test]
    fn test_accepts_and_transforms() {
        let outcome = processor()
            .process(record("1", "ada", "A@X.IO", None))
            .unwrap();

        let ProcessOutcome::Accepted(record) = outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert_eq!(record.value("id"), Some("1"));
        assert_eq!(record.value("name"), Some("ADA"));
        assert_eq!(record.value("email"), Some("a@x.io"));
        assert_eq!(record.value("dept"), Some("GENERAL"));
    }

    #[test]
    fn test_empty_value_keeps_empty_over_default() {
        let outcome = processor()
            .process(record("1", "ada", "a@x.io", Some("")))
            .unwrap();

        let ProcessOutcome::Accepted(record) = outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert_eq!(record.value("dept"), Some(""));
    }

    #[test]
    fn test_one_failing_column_rejects_record() {
        let outcome = processor().process(record("2", "bob", "bad", Some("ops"))).unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::Rejected {
                line: 2,
                column: "email".to_string(),
                value: Some("bad".to_string()),
                rule: "EMAIL".to_string(),
            }
        );
    }

    #[test]
    fn test_first_failure_wins() {
        let outcome = processor().process(record("x", "", "bad", None)).unwrap();
        assert!(matches!(outcome, ProcessOutcome::Rejected { ref column, .. } if column == "id"));
    }

    #[test]
    fn test_unbound_processor() {
        let processor = RecordProcessor::unbound(Arc::new(RuleRegistry::default()));
        let outcome = processor.process(record("1", "a", "a@x.io", None)).unwrap();
        assert_eq!(outcome, ProcessOutcome::Unconfigured);
        assert!(processor.check_rules().is_ok());
    }

    #[test]
    fn test_invalid_pattern_is_fatal() {
        let config = FileConfig::new("t", "unused", "t")
            .with_column(ColumnConfig::new("code", "code", "STRING", 1).with_validation("(open"));
        let processor = RecordProcessor::new(Arc::new(config), Arc::new(RuleRegistry::default()));

        assert!(matches!(processor.check_rules(), Err(LoadError::InvalidRule { .. })));

        let mut record = GenericDataRecord::new("t", 1);
        record.set_value("code", Some("x".to_string()));
        assert!(matches!(processor.process(record), Err(LoadError::InvalidRule { .. })));
    }
}
