//! Load trigger routes
//!
//! - `POST /api/v1/loads/:config_name` - Queue a load of an active configuration
//! - `GET /api/v1/loads/:run_id` - Status and counters of one run
//! - `GET /api/v1/loads?limit=50` - Most recent runs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use super::{
    commands::{SubmitLoadCommand, SubmitLoadError},
    queries::{GetLoadError, GetLoadQuery, ListLoadsError, ListLoadsQuery},
};
use crate::api::response::{ApiResponse, ErrorResponse};
use crate::features::FeatureState;
use crate::load::SubmitError;

pub fn loads_routes() -> Router<FeatureState> {
    // One path segment serves both a configuration name (POST) and a run id (GET).
    Router::new()
        .route("/", get(list_loads))
        .route("/:id", get(get_load).post(submit_load))
}

/// Queue a load
///
/// # Response
///
/// - `202 Accepted` - Run queued, body carries its `run_id`
/// - `404 Not Found` - No active configuration with this name
/// - `503 Service Unavailable` - Queue full or executor stopped
#[tracing::instrument(skip(state))]
async fn submit_load(
    State(state): State<FeatureState>,
    Path(config_name): Path<String>,
) -> Result<Response, LoadApiError> {
    let response =
        super::commands::submit::handle(state.executor, SubmitLoadCommand { config_name }).await?;

    tracing::info!(run_id = %response.run_id, "Load submitted via API");

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state))]
async fn get_load(
    State(state): State<FeatureState>,
    Path(run_id): Path<Uuid>,
) -> Result<Response, LoadApiError> {
    let run = super::queries::get::handle(state.runs, GetLoadQuery { run_id }).await?;
    Ok((StatusCode::OK, Json(ApiResponse::success(run))).into_response())
}

#[tracing::instrument(skip(state))]
async fn list_loads(
    State(state): State<FeatureState>,
    Query(query): Query<ListLoadsQuery>,
) -> Result<Response, LoadApiError> {
    let limit = query.limit();
    let runs = super::queries::list::handle(state.runs, query).await?;

    let meta = json!({ "limit": limit, "count": runs.len() });
    Ok((StatusCode::OK, Json(ApiResponse::success_with_meta(runs, meta))).into_response())
}

#[derive(Debug)]
enum LoadApiError {
    Submit(SubmitLoadError),
    Get(GetLoadError),
    List(ListLoadsError),
}

impl From<SubmitLoadError> for LoadApiError {
    fn from(err: SubmitLoadError) -> Self {
        Self::Submit(err)
    }
}

impl From<GetLoadError> for LoadApiError {
    fn from(err: GetLoadError) -> Self {
        Self::Get(err)
    }
}

impl From<ListLoadsError> for LoadApiError {
    fn from(err: ListLoadsError) -> Self {
        Self::List(err)
    }
}

impl IntoResponse for LoadApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            LoadApiError::Submit(err @ SubmitLoadError::NameRequired) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
            },
            LoadApiError::List(err @ ListLoadsError::InvalidLimit) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string())
            },
            LoadApiError::Submit(SubmitLoadError::Submit(err @ SubmitError::ConfigurationMissing(_))) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            },
            LoadApiError::Get(err @ GetLoadError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            },
            LoadApiError::Submit(SubmitLoadError::Submit(err @ (SubmitError::QueueFull | SubmitError::Closed))) => {
                tracing::warn!("Load rejected: {}", err);
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", err.to_string())
            },
            LoadApiError::Submit(SubmitLoadError::Submit(SubmitError::Store(err)))
            | LoadApiError::Get(GetLoadError::Database(err))
            | LoadApiError::List(ListLoadsError::Database(err)) => {
                tracing::error!("Database error during load request: {}", err);
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
