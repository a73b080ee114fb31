//! `flatload` command line
//!
//! Runs loads in the foreground, either from a configuration stored in the
//! database or from a JSON file, and inspects stored configurations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::config::Config;
use crate::db::{self, ConfigStore, PgConfigStore};
use crate::load::{
    ChunkOrchestrator, Destination, FileConfig, LoadError, MemoryDestination, PgDestination,
    PostLoadAnalytics, RuleRegistry, TableProfiler, TableSchema,
};

#[derive(Parser, Debug)]
#[command(name = "flatload")]
#[command(author, version, about = "Load delimited files into database tables", long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a load in the foreground
    Run(RunArgs),

    /// Inspect stored configurations
    Configs {
        #[command(subcommand)]
        command: ConfigsCommand,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Name of an active configuration in the database
    #[arg(required_unless_present = "config_file", conflicts_with = "config_file")]
    pub name: Option<String>,

    /// Read the configuration from a JSON file instead of the database
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Load into an in-memory table instead of the database
    #[arg(long)]
    pub dry_run: bool,

    /// Write a table profile under this directory after a successful load
    #[arg(long, value_name = "DIR", env = "LOAD_ANALYTICS_DIR")]
    pub analytics_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigsCommand {
    /// List active configurations
    List,

    /// Show one active configuration with its columns
    Show { name: String },
}

/// Parse and validate a configuration file
pub fn read_config_file(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut config: FileConfig = serde_json::from_str(&content)
        .with_context(|| format!("Invalid configuration file {}", path.display()))?;

    config.sort_columns();
    config.validate()?;
    TableSchema::from_config(&config)?;
    Ok(config)
}

async fn connect() -> Result<sqlx::PgPool> {
    let config = Config::load()?;
    db::create_pool(&config.database)
        .await
        .context("Failed to connect to the database")
}

pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Configs { command } => configs(command).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let pool = if args.dry_run && args.config_file.is_some() {
        None
    } else {
        Some(connect().await?)
    };

    let config = match (&args.config_file, &args.name, &pool) {
        (Some(path), _, _) => read_config_file(path)?,
        (None, Some(name), Some(pool)) => PgConfigStore::new(pool.clone())
            .find_active(name)
            .await?
            .ok_or_else(|| LoadError::ConfigurationMissing(name.clone()))?,
        _ => anyhow::bail!("Either a configuration name or --config-file is required"),
    };

    let destination: Arc<dyn Destination> = match (&pool, args.dry_run) {
        (Some(pool), false) => Arc::new(PgDestination::new(pool.clone())),
        _ => Arc::new(MemoryDestination::new()),
    };

    tracing::info!(
        config = %config.config_name,
        table = %config.target_table_name,
        dry_run = args.dry_run,
        "Starting load"
    );

    let config = Arc::new(config);
    let mut orchestrator = ChunkOrchestrator::new(
        config.clone(),
        Arc::new(RuleRegistry::default()),
        destination.clone(),
    );

    let report = match orchestrator.run().await {
        Ok(report) => report,
        Err(failure) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "status": "failed",
                    "error": failure.error.to_string(),
                    "kind": failure.error.kind(),
                    "report": failure.report,
                }))?
            );
            return Err(failure.error.into());
        },
    };

    if let Some(dir) = &args.analytics_dir {
        let schema = TableSchema::from_config(&config)?;
        match TableProfiler::new(destination).analyze(&schema, dir).await {
            Ok(path) => tracing::info!(path = %path.display(), "Analytics completed"),
            Err(e) => tracing::warn!(error = %e, "Analytics failed"),
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "status": "completed",
            "dry_run": args.dry_run,
            "report": report,
        }))?
    );
    Ok(())
}

async fn configs(command: ConfigsCommand) -> Result<()> {
    let store = PgConfigStore::new(connect().await?);

    match command {
        ConfigsCommand::List => {
            for config in store.list_active().await? {
                println!(
                    "{}\t{}\t{}",
                    config.config_name, config.target_table_name, config.source_file_path
                );
            }
        },
        ConfigsCommand::Show { name } => {
            let config = store
                .find_active(&name)
                .await?
                .ok_or_else(|| LoadError::ConfigurationMissing(name.clone()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        },
    }
    Ok(())
}
