//! HTTP feature slices
//!
//! Each feature is a vertical slice:
//! - `commands/` - Write operations, one `handle` function per command
//! - `queries/` - Read operations
//! - `routes.rs` - Axum handlers and the mapping of feature errors to responses
//!
//! # Features
//!
//! - **configs**: Store, list, read and deactivate load configurations
//! - **loads**: Queue loads and follow their runs

pub mod configs;
pub mod loads;

use std::sync::Arc;

use axum::Router;

use crate::db::{ConfigStore, RunTracker};
use crate::load::LoadExecutor;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    pub configs: Arc<dyn ConfigStore>,
    pub runs: Arc<dyn RunTracker>,
    pub executor: Arc<LoadExecutor>,
}

/// Feature routes, mounted by the caller under `/api/v1`
///
/// - `/configs` - Load configurations
/// - `/loads` - Load runs
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/configs", configs::configs_routes())
        .nest("/loads", loads::loads_routes())
        .with_state(state)
}
