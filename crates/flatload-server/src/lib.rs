//! flatload server library
//!
//! Loads delimited text files into relational tables, driven by
//! configuration stored in the database.
//!
//! # Overview
//!
//! - **Load pipeline** ([`load`]): reading, rule checks, schema
//!   provisioning and chunk-atomic writes
//! - **Persistence** ([`db`]): configuration store and run tracking on
//!   PostgreSQL via SQLx, with in-memory counterparts
//! - **HTTP API** ([`api`], [`features`]): trigger loads and manage
//!   configurations under `/api/v1`
//! - **Configuration** ([`config`]): environment-based settings
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use flatload_server::db::{MemoryRunTracker, PgConfigStore};
//! use flatload_server::load::{ExecutorSettings, LoadExecutor, PgDestination};
//!
//! # async fn run(pool: sqlx::PgPool) -> anyhow::Result<()> {
//! let executor = LoadExecutor::start(
//!     ExecutorSettings::default(),
//!     Arc::new(PgConfigStore::new(pool.clone())),
//!     Arc::new(MemoryRunTracker::new()),
//!     Arc::new(PgDestination::new(pool)),
//!     None,
//! );
//! let run_id = executor.submit("employees").await?;
//! println!("queued {run_id}");
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod features;
pub mod load;
pub mod middleware;
