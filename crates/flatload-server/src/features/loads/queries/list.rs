use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::{DbError, LoadRun, RunTracker};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListLoadsQuery {
    pub limit: Option<i64>,
}

impl ListLoadsQuery {
    pub fn validate(&self) -> Result<(), ListLoadsError> {
        match self.limit {
            Some(limit) if !(1..=MAX_LIMIT).contains(&limit) => Err(ListLoadsError::InvalidLimit),
            _ => Ok(()),
        }
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListLoadsError {
    #[error("limit must be between 1 and {MAX_LIMIT}")]
    InvalidLimit,
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

/// Most recent runs first
#[tracing::instrument(skip(tracker))]
pub async fn handle(
    tracker: Arc<dyn RunTracker>,
    query: ListLoadsQuery,
) -> Result<Vec<LoadRun>, ListLoadsError> {
    query.validate()?;
    Ok(tracker.list_recent(query.limit()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit() {
        let query = ListLoadsQuery::default();
        assert!(query.validate().is_ok());
        assert_eq!(query.limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn test_limit_bounds() {
        assert!(ListLoadsQuery { limit: Some(0) }.validate().is_err());
        assert!(ListLoadsQuery { limit: Some(MAX_LIMIT + 1) }.validate().is_err());
        assert!(ListLoadsQuery { limit: Some(MAX_LIMIT) }.validate().is_ok());
    }
}
