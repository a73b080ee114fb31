//! HTTP surface: router assembly and service-level handlers

pub mod response;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use tower_http::compression::CompressionLayer;

use crate::config::CorsConfig;
use crate::db;
use crate::features::{self, FeatureState};
use crate::middleware;
use response::AppError;

/// Application state shared by service-level handlers
#[derive(Clone)]
pub struct AppState {
    pub features: FeatureState,
    /// `None` when the stores are held in memory
    pub db: Option<PgPool>,
}

/// Full application router with middleware applied
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let feature_routes = features::router(state.features.clone());

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/v1/health", get(health_check))
        .with_state(state)
        .nest("/api/v1", feature_routes)
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "flatload",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

/// Database connectivity and free queue slots
async fn health_check(State(state): State<AppState>) -> Result<Response, AppError> {
    let queue_capacity = state.features.executor.available_capacity();

    let database = match &state.db {
        Some(pool) => match db::health_check(pool).await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::error!("Database health check failed: {}", e);
                return Err(AppError::ServiceUnavailable("Database is unreachable".to_string()));
            },
        },
        None => "not_configured",
    };

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "database": database,
            "queue_capacity": queue_capacity
        })),
    )
        .into_response())
}
