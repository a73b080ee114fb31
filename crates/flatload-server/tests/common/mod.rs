//! Shared helpers for flatload integration tests
//!
//! In-memory stores back the application for route and pipeline tests.
//! [`TestPostgres`] starts a throwaway PostgreSQL container with the
//! migrations applied, for the tests marked `#[ignore]`.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{body::Body, http::Request, Router};
use flatload_server::{
    api::{self, AppState},
    config::CorsConfig,
    db::{LoadRun, MemoryConfigStore, MemoryRunTracker, RunTracker},
    features::FeatureState,
    load::{ExecutorSettings, FileConfig, LoadExecutor, MemoryDestination},
};
use http_body_util::BodyExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tower::ServiceExt;
use uuid::Uuid;

/// Write `content` to a temporary file that lives as long as the handle
pub fn source_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Application wired to in-memory stores
pub struct TestApp {
    pub router: Router,
    pub configs: Arc<MemoryConfigStore>,
    pub runs: Arc<MemoryRunTracker>,
    pub destination: Arc<MemoryDestination>,
    pub executor: Arc<LoadExecutor>,
}

impl TestApp {
    pub async fn start(settings: ExecutorSettings, configs: Vec<FileConfig>) -> Self {
        let configs = Arc::new(MemoryConfigStore::with_configs(configs).await.unwrap());
        let runs = Arc::new(MemoryRunTracker::new());
        let destination = Arc::new(MemoryDestination::new());

        let executor = Arc::new(LoadExecutor::start(
            settings,
            configs.clone(),
            runs.clone(),
            destination.clone(),
            None,
        ));

        let state = AppState {
            features: FeatureState {
                configs: configs.clone(),
                runs: runs.clone(),
                executor: executor.clone(),
            },
            db: None,
        };
        let cors = CorsConfig {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: false,
        };

        Self {
            router: api::create_router(state, &cors),
            configs,
            runs,
            destination,
            executor,
        }
    }

    pub async fn get(&self, uri: &str) -> (axum::http::StatusCode, serde_json::Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post(
        &self,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (axum::http::StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        self.send(request.body(body).unwrap()).await
    }

    pub async fn delete(&self, uri: &str) -> (axum::http::StatusCode, serde_json::Value) {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (axum::http::StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, json)
    }

    /// Poll the tracker until the run reaches a terminal status
    pub async fn wait_for_run(&self, id: Uuid) -> LoadRun {
        wait_for_run(self.runs.as_ref(), id).await
    }
}

pub async fn wait_for_run(tracker: &dyn RunTracker, id: Uuid) -> LoadRun {
    for _ in 0..300 {
        if let Some(run) = tracker.get(id).await.unwrap() {
            if run.status.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {id} did not finish");
}

/// PostgreSQL test container with migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;
        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
