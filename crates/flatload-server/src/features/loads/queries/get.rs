use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{DbError, LoadRun, RunTracker};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLoadQuery {
    pub run_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum GetLoadError {
    #[error("Load run '{0}' not found")]
    NotFound(Uuid),
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

#[tracing::instrument(skip(tracker))]
pub async fn handle(tracker: Arc<dyn RunTracker>, query: GetLoadQuery) -> Result<LoadRun, GetLoadError> {
    tracker
        .get(query.run_id)
        .await?
        .ok_or(GetLoadError::NotFound(query.run_id))
}
