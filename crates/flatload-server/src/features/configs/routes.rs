//! Configuration API routes
//!
//! - `POST /api/v1/configs` - Store a new configuration
//! - `GET /api/v1/configs` - List active configurations
//! - `GET /api/v1/configs/:name` - Get an active configuration with its columns
//! - `DELETE /api/v1/configs/:name` - Deactivate a configuration

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use super::{
    commands::{
        CreateConfigCommand, CreateConfigError, DeactivateConfigCommand, DeactivateConfigError,
    },
    queries::{GetConfigError, GetConfigQuery, ListConfigsError},
};
use crate::api::response::{ApiResponse, ErrorResponse};
use crate::features::FeatureState;

pub fn configs_routes() -> Router<FeatureState> {
    Router::new()
        .route("/", get(list_configs).post(create_config))
        .route("/:name", get(get_config).delete(deactivate_config))
}

/// Create a configuration
///
/// # Response
///
/// - `201 Created` - Configuration stored
/// - `400 Bad Request` - Structural, identifier, type or pattern error
/// - `409 Conflict` - An active configuration with this name exists
#[tracing::instrument(
    skip(state, command),
    fields(name = %command.config.config_name)
)]
async fn create_config(
    State(state): State<FeatureState>,
    Json(command): Json<CreateConfigCommand>,
) -> Result<Response, ConfigApiError> {
    let config = super::commands::create::handle(state.configs, state.executor.rules(), command).await?;

    tracing::info!(id = ?config.id, table = %config.target_table_name, "Configuration created via API");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(config))).into_response())
}

/// Deactivate a configuration
///
/// # Response
///
/// - `204 No Content` - Configuration deactivated
/// - `404 Not Found` - No active configuration with this name
#[tracing::instrument(skip(state))]
async fn deactivate_config(
    State(state): State<FeatureState>,
    Path(name): Path<String>,
) -> Result<Response, ConfigApiError> {
    super::commands::deactivate::handle(state.configs, DeactivateConfigCommand { name }).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[tracing::instrument(skip(state))]
async fn get_config(
    State(state): State<FeatureState>,
    Path(name): Path<String>,
) -> Result<Response, ConfigApiError> {
    let config = super::queries::get::handle(state.configs, GetConfigQuery { name }).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(config))).into_response())
}

async fn list_configs(State(state): State<FeatureState>) -> Result<Response, ConfigApiError> {
    let items = super::queries::list::handle(state.configs).await?;

    tracing::debug!(count = items.len(), "Configurations listed via API");

    Ok((StatusCode::OK, Json(ApiResponse::success(items))).into_response())
}

/// Unified error type for configuration endpoints
#[derive(Debug)]
enum ConfigApiError {
    Create(CreateConfigError),
    Deactivate(DeactivateConfigError),
    Get(GetConfigError),
    List(ListConfigsError),
}

impl From<CreateConfigError> for ConfigApiError {
    fn from(err: CreateConfigError) -> Self {
        Self::Create(err)
    }
}

impl From<DeactivateConfigError> for ConfigApiError {
    fn from(err: DeactivateConfigError) -> Self {
        Self::Deactivate(err)
    }
}

impl From<GetConfigError> for ConfigApiError {
    fn from(err: GetConfigError) -> Self {
        Self::Get(err)
    }
}

impl From<ListConfigsError> for ConfigApiError {
    fn from(err: ListConfigsError) -> Self {
        Self::List(err)
    }
}

impl IntoResponse for ConfigApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ConfigApiError::Create(err @ CreateConfigError::Invalid(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
            },
            ConfigApiError::Deactivate(err @ DeactivateConfigError::NameRequired) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
            },
            ConfigApiError::Create(err @ CreateConfigError::Duplicate(_)) => {
                (StatusCode::CONFLICT, "CONFLICT", err.to_string())
            },
            ConfigApiError::Deactivate(err @ DeactivateConfigError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            },
            ConfigApiError::Get(err @ GetConfigError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            },
            ConfigApiError::Create(CreateConfigError::Database(err))
            | ConfigApiError::Deactivate(DeactivateConfigError::Database(err))
            | ConfigApiError::Get(GetConfigError::Database(err))
            | ConfigApiError::List(ListConfigsError::Database(err)) => {
                tracing::error!("Database error during configuration request: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "A database error occurred".to_string(),
                )
            },
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
