use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{ConfigStore, DbError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeactivateConfigCommand {
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeactivateConfigError {
    #[error("Configuration name is required")]
    NameRequired,
    #[error("Configuration '{0}' not found")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl DeactivateConfigCommand {
    pub fn validate(&self) -> Result<(), DeactivateConfigError> {
        if self.name.trim().is_empty() {
            return Err(DeactivateConfigError::NameRequired);
        }
        Ok(())
    }
}

/// Deactivate the named configuration; runs already queued keep their copy
#[tracing::instrument(skip(store))]
pub async fn handle(
    store: Arc<dyn ConfigStore>,
    command: DeactivateConfigCommand,
) -> Result<(), DeactivateConfigError> {
    command.validate()?;

    if store.deactivate(&command.name).await? {
        Ok(())
    } else {
        Err(DeactivateConfigError::NotFound(command.name))
    }
}
