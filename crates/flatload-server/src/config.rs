//! Server configuration from the environment
//!
//! A `.env` file is read first when present; variables already set win.

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration Constants
// ============================================================================

use std::path::PathBuf;

use crate::load::{ExecutorSettings, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT};

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/flatload";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default root directory for post-load analytics output.
pub const DEFAULT_ANALYTICS_DIR: &str = "./analytics";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub load: LoadSettings,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Load executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub analytics_enabled: bool,
    pub analytics_dir: PathBuf,
}

impl LoadSettings {
    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            worker_count: self.worker_count,
            queue_capacity: self.queue_capacity,
            analytics_dir: self.analytics_enabled.then(|| self.analytics_dir.clone()),
        }
    }
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            analytics_enabled: true,
            analytics_dir: PathBuf::from(DEFAULT_ANALYTICS_DIR),
        }
    }
}

/// Parsed value of an environment variable, or `default` when unset or unparseable
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("FLATLOAD_HOST")
                    .unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("FLATLOAD_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or(
                    "FLATLOAD_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
            load: LoadSettings {
                worker_count: env_or("LOAD_WORKER_COUNT", DEFAULT_WORKER_COUNT),
                queue_capacity: env_or("LOAD_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
                analytics_enabled: env_or("LOAD_ANALYTICS_ENABLED", true),
                analytics_dir: std::env::var("LOAD_ANALYTICS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_ANALYTICS_DIR)),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate port
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        // Validate database URL
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Validate connection pool settings
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.load.worker_count == 0 {
            anyhow::bail!("LOAD_WORKER_COUNT must be greater than 0");
        }

        if self.load.queue_capacity == 0 {
            anyhow::bail!("LOAD_QUEUE_CAPACITY must be greater than 0");
        }

        // Validate CORS origins
        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            load: LoadSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_pool_bounds() {
        let mut config = Config::default();
        config.database.min_connections = config.database.max_connections + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.load.worker_count = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("LOAD_WORKER_COUNT"));
    }

    #[test]
    fn test_analytics_toggle() {
        let mut settings = LoadSettings::default();
        assert_eq!(
            settings.executor_settings().analytics_dir,
            Some(PathBuf::from(DEFAULT_ANALYTICS_DIR))
        );

        settings.analytics_enabled = false;
        assert!(settings.executor_settings().analytics_dir.is_none());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("FLATLOAD_TEST_ENV_OR", "not-a-number");
        assert_eq!(env_or("FLATLOAD_TEST_ENV_OR", 7u16), 7);
        std::env::set_var("FLATLOAD_TEST_ENV_OR", "9");
        assert_eq!(env_or("FLATLOAD_TEST_ENV_OR", 7u16), 9);
        std::env::remove_var("FLATLOAD_TEST_ENV_OR");
    }
}
