//! Process-wide load executor
//!
//! Loads are submitted by configuration name and run on a fixed pool of
//! worker tasks fed from a bounded queue. Submission never waits: when the
//! queue is full the load is rejected. Each run executes sequentially on one
//! worker, followed by post-load analytics when the load completed.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::analytics::PostLoadAnalytics;
use super::destination::Destination;
use super::model::FileConfig;
use super::orchestrator::{ChunkOrchestrator, ProgressListener, RunReport, RunState};
use super::rules::RuleRegistry;
use super::schema::TableSchema;
use crate::db::{ConfigStore, DbError, RunStatus, RunTracker};

/// Default number of worker tasks
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default number of queued loads before submissions are rejected
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// Root directory for analytics output; `None` disables analytics
    pub analytics_dir: Option<PathBuf>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            analytics_dir: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Configuration not found or inactive: {0}")]
    ConfigurationMissing(String),

    #[error("Load queue is full")]
    QueueFull,

    #[error("Load executor is shut down")]
    Closed,

    #[error(transparent)]
    Store(#[from] DbError),
}

struct LoadJob {
    run_id: Uuid,
    config: Arc<FileConfig>,
}

/// Collaborators shared by every worker
struct WorkerContext {
    tracker: Arc<dyn RunTracker>,
    destination: Arc<dyn Destination>,
    rules: Arc<RuleRegistry>,
    analytics: Option<Arc<dyn PostLoadAnalytics>>,
    analytics_dir: Option<PathBuf>,
}

pub struct LoadExecutor {
    /// `None` once shut down
    sender: RwLock<Option<mpsc::Sender<LoadJob>>>,
    /// Shared with the workers; held here so the queue stays open with none
    receiver: Arc<Mutex<mpsc::Receiver<LoadJob>>>,
    configs: Arc<dyn ConfigStore>,
    tracker: Arc<dyn RunTracker>,
    rules: Arc<RuleRegistry>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LoadExecutor {
    /// Spawn the worker pool
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(
        settings: ExecutorSettings,
        configs: Arc<dyn ConfigStore>,
        tracker: Arc<dyn RunTracker>,
        destination: Arc<dyn Destination>,
        analytics: Option<Arc<dyn PostLoadAnalytics>>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let rules = Arc::new(RuleRegistry::default());
        let context = Arc::new(WorkerContext {
            tracker: tracker.clone(),
            destination,
            rules: rules.clone(),
            analytics,
            analytics_dir: settings.analytics_dir.clone(),
        });

        let workers = (0..settings.worker_count)
            .map(|worker| {
                let receiver = receiver.clone();
                let context = context.clone();
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        match job {
                            Some(job) => context.clone().execute_isolated(worker, job).await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        info!(
            workers = settings.worker_count,
            queue_capacity = settings.queue_capacity,
            "Load executor started"
        );

        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            configs,
            tracker,
            rules,
            workers: Mutex::new(workers),
        }
    }

    /// Rule registry the workers process records with
    pub fn rules(&self) -> Arc<RuleRegistry> {
        self.rules.clone()
    }

    /// Queue a load of the named active configuration
    ///
    /// Returns the id of the new run. Fails immediately when the configuration
    /// does not exist or the queue has no free slot.
    pub async fn submit(&self, config_name: &str) -> Result<Uuid, SubmitError> {
        let sender = self.sender.read().await;
        let sender = sender.as_ref().ok_or(SubmitError::Closed)?;
        let permit = sender.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => SubmitError::QueueFull,
            mpsc::error::TrySendError::Closed(()) => SubmitError::Closed,
        })?;

        let config = self
            .configs
            .find_active(config_name)
            .await?
            .ok_or_else(|| SubmitError::ConfigurationMissing(config_name.to_string()))?;

        let run = self.tracker.create(config_name).await?;
        permit.send(LoadJob {
            run_id: run.id,
            config: Arc::new(config),
        });

        info!(run_id = %run.id, config = config_name, "Load queued");
        Ok(run.id)
    }

    /// Free queue slots; zero after shutdown or while shutdown is in progress
    pub fn available_capacity(&self) -> usize {
        self.sender
            .try_read()
            .ok()
            .and_then(|sender| sender.as_ref().map(mpsc::Sender::capacity))
            .unwrap_or(0)
    }

    /// Stop accepting loads and wait for queued ones to finish
    pub async fn shutdown(&self) {
        drop(self.sender.write().await.take());

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Load worker panicked");
            }
        }

        let abandoned = self.receiver.lock().await.len();
        if abandoned > 0 {
            warn!(abandoned, "Load executor stopped with queued loads and no workers");
        }
        info!("Load executor stopped");
    }
}

impl WorkerContext {
    /// Run one job in its own task so a panic fails the run, not the worker
    async fn execute_isolated(self: Arc<Self>, worker: usize, job: LoadJob) {
        let run_id = job.run_id;
        let context = self.clone();
        let result = tokio::spawn(async move { context.execute(worker, job).await }).await;

        if let Err(e) = result {
            error!(worker, run_id = %run_id, error = %e, "Load task aborted");
            let report = match self.tracker.get(run_id).await {
                Ok(Some(run)) => run.report(),
                _ => RunReport::default(),
            };
            let message = format!("aborted: {}", e);
            if let Err(e) = self.tracker.fail(run_id, &report, &message).await {
                error!(run_id = %run_id, error = %e, "Failed to record aborted run");
            }
        }
    }

    #[tracing::instrument(skip(self, job), fields(run_id = %job.run_id, config = %job.config.config_name))]
    async fn execute(&self, worker: usize, job: LoadJob) {
        info!(worker, "Load started");

        let listener = Arc::new(TrackerListener {
            tracker: self.tracker.clone(),
            run_id: job.run_id,
        });
        let mut orchestrator =
            ChunkOrchestrator::new(job.config.clone(), self.rules.clone(), self.destination.clone())
                .with_listener(listener);

        match orchestrator.run().await {
            Ok(report) => {
                if let Err(e) = self.tracker.complete(job.run_id, &report).await {
                    error!(error = %e, "Failed to record completed run");
                }
                self.run_analytics(&job.config).await;
            }
            Err(failure) => {
                let message = format!("{}: {}", failure.error.kind(), failure.error);
                if let Err(e) = self.tracker.fail(job.run_id, &failure.report, &message).await {
                    error!(error = %e, "Failed to record failed run");
                }
            }
        }
    }

    /// Analytics problems are logged; they never change the run's outcome
    async fn run_analytics(&self, config: &FileConfig) {
        let (Some(analytics), Some(dir)) = (&self.analytics, &self.analytics_dir) else {
            return;
        };

        let schema = match TableSchema::from_config(config) {
            Ok(schema) => schema,
            Err(e) => {
                warn!(error = %e, "Skipping analytics");
                return;
            }
        };

        match analytics.analyze(&schema, dir).await {
            Ok(path) => info!(path = %path.display(), "Analytics completed"),
            Err(e) => warn!(table = %schema.table_name, error = %e, "Analytics failed"),
        }
    }
}

/// Mirrors orchestrator progress into the run tracker
struct TrackerListener {
    tracker: Arc<dyn RunTracker>,
    run_id: Uuid,
}

#[async_trait]
impl ProgressListener for TrackerListener {
    async fn on_state(&self, state: RunState) {
        // Terminal states are written together with the final counters.
        if state.is_terminal() {
            return;
        }
        if let Err(e) = self.tracker.set_status(self.run_id, RunStatus::from(state)).await {
            warn!(run_id = %self.run_id, error = %e, "Failed to record run status");
        }
    }

    async fn on_chunk(&self, report: &RunReport) {
        if let Err(e) = self.tracker.record_progress(self.run_id, report).await {
            warn!(run_id = %self.run_id, error = %e, "Failed to record run progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryConfigStore, MemoryRunTracker};
    use crate::load::analytics::TableProfile;
    use crate::load::destination::MemoryDestination;
    use crate::load::error::DestinationError;
    use crate::load::model::{ColumnConfig, GenericDataRecord};
    use std::io::Write;
    use std::time::Duration;

    fn numbers_config(path: &str) -> FileConfig {
        FileConfig::new("numbers", path, "numbers")
            .with_chunk_size(2)
            .with_column(ColumnConfig::new("n", "n", "INTEGER", 1))
    }

    async fn wait_for_terminal(tracker: &MemoryRunTracker, id: Uuid) -> crate::db::LoadRun {
        for _ in 0..200 {
            let run = tracker.get(id).await.unwrap().unwrap();
            if run.status.is_terminal() {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {id} did not finish");
    }

    #[tokio::test]
    async fn test_submit_runs_load_to_completion() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"n\n1\n2\n3\n").unwrap();

        let configs = Arc::new(
            MemoryConfigStore::with_configs([numbers_config(file.path().to_str().unwrap())])
                .await
                .unwrap(),
        );
        let tracker = Arc::new(MemoryRunTracker::new());
        let destination = Arc::new(MemoryDestination::new());

        let executor = LoadExecutor::start(
            ExecutorSettings::default(),
            configs,
            tracker.clone(),
            destination.clone(),
            None,
        );

        let run_id = executor.submit("numbers").await.unwrap();
        let run = wait_for_terminal(&tracker, run_id).await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.records_written, 3);
        assert_eq!(run.chunks_committed, 2);
        assert_eq!(destination.row_count("numbers").await, 3);

        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_load_is_recorded() {
        let configs = Arc::new(
            MemoryConfigStore::with_configs([numbers_config("/nonexistent/flatload/n.csv")])
                .await
                .unwrap(),
        );
        let tracker = Arc::new(MemoryRunTracker::new());

        let executor = LoadExecutor::start(
            ExecutorSettings::default(),
            configs,
            tracker.clone(),
            Arc::new(MemoryDestination::new()),
            None,
        );

        let run_id = executor.submit("numbers").await.unwrap();
        let run = wait_for_terminal(&tracker, run_id).await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.unwrap().starts_with("source_open"));
    }

    /// Panics on its first insert, then behaves like a memory table
    struct PanicOnce {
        inner: MemoryDestination,
        panicked: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Destination for PanicOnce {
        async fn table_exists(&self, table: &str) -> Result<bool, DestinationError> {
            self.inner.table_exists(table).await
        }

        async fn create_table(&self, schema: &TableSchema) -> Result<(), DestinationError> {
            self.inner.create_table(schema).await
        }

        async fn insert_chunk(
            &self,
            schema: &TableSchema,
            records: &[GenericDataRecord],
        ) -> Result<u64, DestinationError> {
            if !self.panicked.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("destination blew up");
            }
            self.inner.insert_chunk(schema, records).await
        }

        async fn profile_table(&self, schema: &TableSchema) -> Result<TableProfile, DestinationError> {
            self.inner.profile_table(schema).await
        }
    }

    #[tokio::test]
    async fn test_panicking_load_fails_run_and_keeps_worker() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"n\n1\n2\n3\n").unwrap();

        let configs = Arc::new(
            MemoryConfigStore::with_configs([numbers_config(file.path().to_str().unwrap())])
                .await
                .unwrap(),
        );
        let tracker = Arc::new(MemoryRunTracker::new());
        let settings = ExecutorSettings {
            worker_count: 1,
            ..ExecutorSettings::default()
        };
        let executor = LoadExecutor::start(
            settings,
            configs,
            tracker.clone(),
            Arc::new(PanicOnce {
                inner: MemoryDestination::new(),
                panicked: std::sync::atomic::AtomicBool::new(false),
            }),
            None,
        );

        let first = executor.submit("numbers").await.unwrap();
        let run = wait_for_terminal(&tracker, first).await;
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.unwrap().starts_with("aborted"));

        // The single worker is still alive to pick up the next load.
        let second = executor.submit("numbers").await.unwrap();
        let run = wait_for_terminal(&tracker, second).await;
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.records_written, 3);

        executor.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_config_is_rejected() {
        let executor = LoadExecutor::start(
            ExecutorSettings::default(),
            Arc::new(MemoryConfigStore::new()),
            Arc::new(MemoryRunTracker::new()),
            Arc::new(MemoryDestination::new()),
            None,
        );

        assert!(matches!(
            executor.submit("missing").await,
            Err(SubmitError::ConfigurationMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let configs = Arc::new(
            MemoryConfigStore::with_configs([numbers_config("/tmp/unused.csv")])
                .await
                .unwrap(),
        );
        // No workers, so nothing drains the queue.
        let settings = ExecutorSettings {
            worker_count: 0,
            queue_capacity: 1,
            analytics_dir: None,
        };
        let executor = LoadExecutor::start(
            settings,
            configs,
            Arc::new(MemoryRunTracker::new()),
            Arc::new(MemoryDestination::new()),
            None,
        );

        assert!(executor.submit("numbers").await.is_ok());
        assert_eq!(executor.available_capacity(), 0);
        assert!(matches!(executor.submit("numbers").await, Err(SubmitError::QueueFull)));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_closed() {
        let configs = Arc::new(
            MemoryConfigStore::with_configs([numbers_config("/tmp/unused.csv")])
                .await
                .unwrap(),
        );
        let executor = LoadExecutor::start(
            ExecutorSettings::default(),
            configs,
            Arc::new(MemoryRunTracker::new()),
            Arc::new(MemoryDestination::new()),
            None,
        );

        executor.shutdown().await;
        assert_eq!(executor.available_capacity(), 0);
        assert!(matches!(executor.submit("numbers").await, Err(SubmitError::Closed)));
    }
}
