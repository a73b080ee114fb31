use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::RunStatus;
use crate::load::{LoadExecutor, SubmitError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitLoadCommand {
    pub config_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitLoadResponse {
    pub run_id: Uuid,
    pub config_name: String,
    pub status: RunStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitLoadError {
    #[error("Configuration name is required")]
    NameRequired,
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl SubmitLoadCommand {
    pub fn validate(&self) -> Result<(), SubmitLoadError> {
        if self.config_name.trim().is_empty() {
            return Err(SubmitLoadError::NameRequired);
        }
        Ok(())
    }
}

/// Queue a load; returns as soon as the run is recorded as pending
#[tracing::instrument(skip(executor))]
pub async fn handle(
    executor: Arc<LoadExecutor>,
    command: SubmitLoadCommand,
) -> Result<SubmitLoadResponse, SubmitLoadError> {
    command.validate()?;

    let run_id = executor.submit(&command.config_name).await?;
    Ok(SubmitLoadResponse {
        run_id,
        config_name: command.config_name,
        status: RunStatus::Pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_empty_name() {
        let cmd = SubmitLoadCommand { config_name: String::new() };
        assert!(matches!(cmd.validate(), Err(SubmitLoadError::NameRequired)));
    }
}
