//! flatload server - HTTP trigger surface and load workers

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use flatload_common::logging::{init_logging, LogConfig};
use tokio::signal;
use tracing::info;

use flatload_server::{
    api::{self, AppState},
    config::Config,
    db::{self, ConfigStore, PgConfigStore, PgRunTracker, RunTracker},
    features::FeatureState,
    load::{Destination, LoadExecutor, PgDestination, PostLoadAnalytics, TableProfiler},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("flatload-server")
        .filter_directives("flatload_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting flatload server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to the database")?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    info!("Database migrations completed");

    let configs: Arc<dyn ConfigStore> = Arc::new(PgConfigStore::new(pool.clone()));
    let runs: Arc<dyn RunTracker> = Arc::new(PgRunTracker::new(pool.clone()));
    let destination: Arc<dyn Destination> = Arc::new(PgDestination::new(pool.clone()));
    let analytics: Option<Arc<dyn PostLoadAnalytics>> = config
        .load
        .analytics_enabled
        .then(|| Arc::new(TableProfiler::new(destination.clone())) as Arc<dyn PostLoadAnalytics>);

    let executor = Arc::new(LoadExecutor::start(
        config.load.executor_settings(),
        configs.clone(),
        runs.clone(),
        destination,
        analytics,
    ));

    let state = AppState {
        features: FeatureState {
            configs,
            runs,
            executor: executor.clone(),
        },
        db: Some(pool),
    };

    let app = api::create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid FLATLOAD_HOST/FLATLOAD_PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    // Queued loads finish before exit.
    executor.shutdown().await;

    info!("Server shut down gracefully");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
