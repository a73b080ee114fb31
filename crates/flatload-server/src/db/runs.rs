//! Load run tracking
//!
//! Every submitted load gets a `load_runs` row that moves through
//! `pending -> provisioning -> loading -> completed | failed` and carries the
//! counters of the run as they are committed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DbError, DbResult};
use crate::load::orchestrator::{RunReport, RunState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Provisioning,
    Loading,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Provisioning => "provisioning",
            RunStatus::Loading => "loading",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl From<String> for RunStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "provisioning" => RunStatus::Provisioning,
            "loading" => RunStatus::Loading,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Pending,
        }
    }
}

impl From<RunState> for RunStatus {
    fn from(state: RunState) -> Self {
        match state {
            RunState::NotStarted => RunStatus::Pending,
            RunState::Provisioning => RunStatus::Provisioning,
            RunState::Loading { .. } => RunStatus::Loading,
            RunState::Completed => RunStatus::Completed,
            RunState::Failed => RunStatus::Failed,
        }
    }
}

/// One execution of a load (maps to `load_runs`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoadRun {
    pub id: Uuid,
    pub config_name: String,
    #[sqlx(try_from = "String")]
    pub status: RunStatus,
    pub records_read: i64,
    pub records_written: i64,
    pub records_skipped: i64,
    pub chunks_committed: i64,
    pub last_committed_line: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LoadRun {
    fn new(config_name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            config_name: config_name.to_string(),
            status: RunStatus::Pending,
            records_read: 0,
            records_written: 0,
            records_skipped: 0,
            chunks_committed: 0,
            last_committed_line: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Counters recorded so far
    pub fn report(&self) -> RunReport {
        let count = |n: i64| u64::try_from(n).unwrap_or(0);
        RunReport {
            records_read: count(self.records_read),
            records_written: count(self.records_written),
            records_skipped: count(self.records_skipped),
            chunks_committed: count(self.chunks_committed),
            last_committed_line: count(self.last_committed_line),
        }
    }

    fn apply_report(&mut self, report: &RunReport) {
        self.records_read = report.records_read as i64;
        self.records_written = report.records_written as i64;
        self.records_skipped = report.records_skipped as i64;
        self.chunks_committed = report.chunks_committed as i64;
        self.last_committed_line = report.last_committed_line as i64;
    }
}

#[async_trait]
pub trait RunTracker: Send + Sync {
    async fn create(&self, config_name: &str) -> DbResult<LoadRun>;

    /// Move a run to a non-terminal status; `started_at` is set on first move
    async fn set_status(&self, id: Uuid, status: RunStatus) -> DbResult<()>;

    /// Store the counters after a committed chunk
    async fn record_progress(&self, id: Uuid, report: &RunReport) -> DbResult<()>;

    async fn complete(&self, id: Uuid, report: &RunReport) -> DbResult<()>;

    async fn fail(&self, id: Uuid, report: &RunReport, message: &str) -> DbResult<()>;

    async fn get(&self, id: Uuid) -> DbResult<Option<LoadRun>>;

    /// Most recent runs first
    async fn list_recent(&self, limit: i64) -> DbResult<Vec<LoadRun>>;
}

pub struct PgRunTracker {
    pool: PgPool,
}

impl PgRunTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn finish(
        &self,
        id: Uuid,
        status: RunStatus,
        report: &RunReport,
        message: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE load_runs
            SET status = $1,
                records_read = $2,
                records_written = $3,
                records_skipped = $4,
                chunks_committed = $5,
                last_committed_line = $6,
                error_message = $7,
                started_at = COALESCE(started_at, NOW()),
                completed_at = NOW()
            WHERE id = $8
            "#,
        )
        .bind(status.as_str())
        .bind(report.records_read as i64)
        .bind(report.records_written as i64)
        .bind(report.records_skipped as i64)
        .bind(report.chunks_committed as i64)
        .bind(report.last_committed_line as i64)
        .bind(message)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Load run", &id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RunTracker for PgRunTracker {
    async fn create(&self, config_name: &str) -> DbResult<LoadRun> {
        let run = sqlx::query_as::<_, LoadRun>(
            r#"
            INSERT INTO load_runs (id, config_name, status)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(config_name)
        .bind(RunStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(run)
    }

    async fn set_status(&self, id: Uuid, status: RunStatus) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE load_runs
            SET status = $1, started_at = COALESCE(started_at, NOW())
            WHERE id = $2
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Load run", &id.to_string()));
        }
        Ok(())
    }

    async fn record_progress(&self, id: Uuid, report: &RunReport) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE load_runs
            SET records_read = $1,
                records_written = $2,
                records_skipped = $3,
                chunks_committed = $4,
                last_committed_line = $5
            WHERE id = $6
            "#,
        )
        .bind(report.records_read as i64)
        .bind(report.records_written as i64)
        .bind(report.records_skipped as i64)
        .bind(report.chunks_committed as i64)
        .bind(report.last_committed_line as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete(&self, id: Uuid, report: &RunReport) -> DbResult<()> {
        self.finish(id, RunStatus::Completed, report, None).await
    }

    async fn fail(&self, id: Uuid, report: &RunReport, message: &str) -> DbResult<()> {
        self.finish(id, RunStatus::Failed, report, Some(message)).await
    }

    async fn get(&self, id: Uuid) -> DbResult<Option<LoadRun>> {
        let run = sqlx::query_as::<_, LoadRun>("SELECT * FROM load_runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(run)
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<LoadRun>> {
        let runs = sqlx::query_as::<_, LoadRun>(
            "SELECT * FROM load_runs ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(runs)
    }
}

/// Run tracker held in process memory
#[derive(Default)]
pub struct MemoryRunTracker {
    runs: RwLock<HashMap<Uuid, LoadRun>>,
}

impl MemoryRunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, id: Uuid, f: F) -> DbResult<()>
    where
        F: FnOnce(&mut LoadRun) + Send,
    {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("Load run", &id.to_string()))?;
        f(run);
        Ok(())
    }
}

#[async_trait]
impl RunTracker for MemoryRunTracker {
    async fn create(&self, config_name: &str) -> DbResult<LoadRun> {
        let run = LoadRun::new(config_name);
        self.runs.write().await.insert(run.id, run.clone());
        Ok(run)
    }

    async fn set_status(&self, id: Uuid, status: RunStatus) -> DbResult<()> {
        self.update(id, |run| {
            run.status = status;
            run.started_at.get_or_insert_with(Utc::now);
        })
        .await
    }

    async fn record_progress(&self, id: Uuid, report: &RunReport) -> DbResult<()> {
        self.update(id, |run| run.apply_report(report)).await
    }

    async fn complete(&self, id: Uuid, report: &RunReport) -> DbResult<()> {
        self.update(id, |run| {
            run.apply_report(report);
            run.status = RunStatus::Completed;
            run.started_at.get_or_insert_with(Utc::now);
            run.completed_at = Some(Utc::now());
        })
        .await
    }

    async fn fail(&self, id: Uuid, report: &RunReport, message: &str) -> DbResult<()> {
        self.update(id, |run| {
            run.apply_report(report);
            run.status = RunStatus::Failed;
            run.error_message = Some(message.to_string());
            run.started_at.get_or_insert_with(Utc::now);
            run.completed_at = Some(Utc::now());
        })
        .await
    }

    async fn get(&self, id: Uuid) -> DbResult<Option<LoadRun>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list_recent(&self, limit: i64) -> DbResult<Vec<LoadRun>> {
        let mut runs: Vec<LoadRun> = self.runs.read().await.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }
}
