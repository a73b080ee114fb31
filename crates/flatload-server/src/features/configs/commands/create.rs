use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{ConfigStore, DbError};
use crate::load::{FileConfig, LoadError, RecordProcessor, RuleRegistry, TableSchema};

/// Body of `POST /configs`: a full configuration with its columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConfigCommand {
    #[serde(flatten)]
    pub config: FileConfig,
}

pub type CreateConfigResponse = FileConfig;

#[derive(Debug, thiserror::Error)]
pub enum CreateConfigError {
    #[error("{0}")]
    Invalid(String),
    #[error("Configuration '{0}' already exists")]
    Duplicate(String),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl From<LoadError> for CreateConfigError {
    fn from(err: LoadError) -> Self {
        Self::Invalid(err.to_string())
    }
}

impl CreateConfigCommand {
    /// Everything a load checks before its first write, checked up front
    pub fn validate(&self, rules: Arc<RuleRegistry>) -> Result<(), CreateConfigError> {
        self.config.validate()?;
        TableSchema::from_config(&self.config)?;
        RecordProcessor::new(Arc::new(self.config.clone()), rules).check_rules()?;
        Ok(())
    }
}

#[tracing::instrument(skip(store, rules, command), fields(name = %command.config.config_name))]
pub async fn handle(
    store: Arc<dyn ConfigStore>,
    rules: Arc<RuleRegistry>,
    command: CreateConfigCommand,
) -> Result<CreateConfigResponse, CreateConfigError> {
    command.validate(rules)?;

    let name = command.config.config_name.clone();
    store.create(command.config).await.map_err(|e| match e {
        DbError::Duplicate(_) => CreateConfigError::Duplicate(name),
        other => CreateConfigError::Database(other),
    })
}
