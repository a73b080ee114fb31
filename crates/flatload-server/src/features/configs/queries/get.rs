use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{ConfigStore, DbError};
use crate::load::FileConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetConfigQuery {
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GetConfigError {
    #[error("Configuration '{0}' not found")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

#[tracing::instrument(skip(store))]
pub async fn handle(
    store: Arc<dyn ConfigStore>,
    query: GetConfigQuery,
) -> Result<FileConfig, GetConfigError> {
    store
        .find_active(&query.name)
        .await?
        .ok_or(GetConfigError::NotFound(query.name))
}
