//! Task dispatcher.
//!
//! Devices poll [`TaskDispatcher::claim_next`]; the oldest eligible pending
//! task is moved to `running` by a single conditional update, so duplicate
//! polls can never both win it. Reports are applied only while the task is
//! still running for the device that claimed it, which makes late and
//! duplicate reports harmless no-ops.

use fleet_core::config::DispatchConfig;
use fleet_core::device::validate_device_id;
use fleet_core::error::CoreError;
use fleet_core::task::{ProgressReport, TaskPayload, TaskReport};
use fleet_core::types::DbId;
use fleet_db::models::task::{StaleSweep, Task};
use fleet_db::repositories::{AccountRepo, TaskRepo};
use serde::Serialize;
use sqlx::PgPool;

use super::EngineError;

/// Result of applying a device report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReportOutcome {
    /// The task reached its terminal state.
    Accepted { task: Task },
    /// The task was not running for this device; nothing changed.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct TaskDispatcher {
    pool: PgPool,
    config: DispatchConfig,
}

impl TaskDispatcher {
    pub fn new(pool: PgPool, config: DispatchConfig) -> Self {
        Self { pool, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Create a pending task for an existing account.
    pub async fn create(&self, account_id: DbId, payload: &TaskPayload) -> Result<Task, EngineError> {
        payload.validate()?;
        AccountRepo::find_by_id(&self.pool, account_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "Account",
                id: account_id,
            })?;

        let task = TaskRepo::create(&self.pool, account_id, payload).await?;
        tracing::info!(
            task_id = task.id,
            account_id,
            kind = %task.kind,
            "Task created",
        );
        Ok(task)
    }

    /// Claim the next task for `device_id`, if any.
    ///
    /// `None` covers every "nothing for you" case alike: no pending task, the
    /// account is not logged in, the device is offline or unknown, or a
    /// concurrent poll won the race.
    pub async fn claim_next(&self, device_id: &str) -> Result<Option<Task>, EngineError> {
        validate_device_id(device_id)?;
        let task =
            TaskRepo::claim_next(&self.pool, device_id, self.config.heartbeat_timeout).await?;
        if let Some(task) = &task {
            tracing::info!(
                task_id = task.id,
                device_id,
                kind = %task.kind,
                "Task claimed",
            );
        }
        Ok(task)
    }

    /// Apply a terminal report from a device.
    pub async fn report(&self, task_id: DbId, report: &TaskReport) -> Result<ReportOutcome, EngineError> {
        let Some(task) = TaskRepo::report_result(&self.pool, task_id, report).await? else {
            tracing::warn!(
                task_id,
                device_id = %report.device_id,
                success = report.success,
                "Report ignored: task is not running under this claim",
            );
            return Ok(ReportOutcome::Ignored);
        };

        if report.success {
            tracing::info!(task_id, device_id = %report.device_id, "Task completed");
        } else {
            tracing::warn!(
                task_id,
                device_id = %report.device_id,
                error = task.error_message.as_deref().unwrap_or_default(),
                auth_failed = report.auth_failed,
                "Task failed",
            );
        }
        Ok(ReportOutcome::Accepted { task })
    }

    /// Record intermediate progress. Returns whether it applied.
    pub async fn report_progress(
        &self,
        task_id: DbId,
        report: &ProgressReport,
    ) -> Result<bool, sqlx::Error> {
        let applied = TaskRepo::report_progress(
            &self.pool,
            task_id,
            &report.device_id,
            report.claim_token,
            report.progress,
        )
        .await?;
        if !applied {
            tracing::debug!(
                task_id,
                device_id = %report.device_id,
                "Progress ignored: task is not running under this claim",
            );
        }
        Ok(applied)
    }

    /// Operator requeue of a single running task.
    pub async fn requeue(&self, task_id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let task = TaskRepo::requeue(&self.pool, task_id, self.config.task_retry_ceiling).await?;
        if let Some(task) = &task {
            tracing::info!(
                task_id,
                retry_count = task.retry_count,
                status_id = task.status_id,
                "Task requeued by operator",
            );
        }
        Ok(task)
    }

    /// Recycle tasks whose device stopped reporting.
    pub async fn requeue_stale(&self) -> Result<StaleSweep, sqlx::Error> {
        let sweep = TaskRepo::requeue_stale(
            &self.pool,
            self.config.task_stale_after,
            self.config.heartbeat_timeout,
            self.config.task_retry_ceiling,
        )
        .await?;
        if !sweep.requeued.is_empty() || !sweep.failed.is_empty() {
            tracing::warn!(
                requeued = ?sweep.requeued,
                failed = ?sweep.failed,
                stale_after_secs = self.config.task_stale_after.as_secs(),
                "Stale tasks recycled",
            );
        }
        Ok(sweep)
    }
}
