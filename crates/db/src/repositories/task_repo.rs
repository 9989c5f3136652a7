//! Repository for the `tasks` table.
//!
//! Every transition is one conditional `UPDATE` whose `WHERE` clause
//! carries the expected current state, so a caller that loses a race sees
//! zero affected rows instead of overwriting the winner.

use std::time::Duration;

use fleet_core::task::{clamp_progress, TaskPayload, TaskReport};
use fleet_core::types::DbId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::status::{LoginStatus, StatusId, TaskStatus};
use crate::models::task::{StaleSweep, Task, TaskListQuery, TaskStats};
use crate::repositories::page;

/// Column list for `tasks` queries.
const COLUMNS: &str = "\
    id, kind, account_id, payload, status_id, progress, error_message, \
    retry_count, claimed_by, claim_token, created_at, started_at, completed_at, updated_at";

/// Same columns qualified with the `t` alias for joined queries.
const T_COLUMNS: &str = "\
    t.id, t.kind, t.account_id, t.payload, t.status_id, t.progress, t.error_message, \
    t.retry_count, t.claimed_by, t.claim_token, t.created_at, t.started_at, t.completed_at, t.updated_at";

/// Error recorded on a task failed by the stale-claim sweep.
pub const STALE_RETRY_EXHAUSTED: &str =
    "Device stopped reporting and the task exhausted its retry ceiling";

/// Error recorded when a device reports failure without a message.
const DEFAULT_FAILURE_MESSAGE: &str = "Task reported failed by device";

/// Requeue-or-fail assignment shared by the single and bulk requeue.
///
/// `$2` retry ceiling, `$3` pending, `$4` failed, `$5` exhaustion message.
const REQUEUE_SET: &str = "\
    status_id = CASE WHEN retry_count < $2 THEN $3 ELSE $4 END, \
    retry_count = CASE WHEN retry_count < $2 THEN retry_count + 1 ELSE retry_count END, \
    error_message = CASE WHEN retry_count < $2 THEN error_message ELSE $5 END, \
    claimed_by = CASE WHEN retry_count < $2 THEN NULL ELSE claimed_by END, \
    claim_token = CASE WHEN retry_count < $2 THEN NULL ELSE claim_token END, \
    started_at = CASE WHEN retry_count < $2 THEN NULL ELSE started_at END, \
    progress = CASE WHEN retry_count < $2 THEN 0 ELSE progress END, \
    completed_at = CASE WHEN retry_count < $2 THEN NULL ELSE NOW() END";

/// Provides creation, claiming and reporting for automation tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Create a pending task for an account.
    pub async fn create(
        pool: &PgPool,
        account_id: DbId,
        payload: &TaskPayload,
    ) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks (kind, account_id, payload, status_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(payload.kind().as_str())
            .bind(account_id)
            .bind(sqlx::types::Json(payload))
            .bind(TaskStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find a task by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List tasks newest first with optional filters.
    ///
    /// `status_id` is resolved by the caller from the status name.
    pub async fn list(
        pool: &PgPool,
        status_id: Option<StatusId>,
        params: &TaskListQuery,
    ) -> Result<Vec<Task>, sqlx::Error> {
        let (limit, offset) = page(params.limit, params.offset);
        let query = format!(
            "SELECT {T_COLUMNS} FROM tasks t \
             JOIN accounts a ON a.id = t.account_id \
             JOIN devices d ON d.id = a.device_id \
             WHERE ($1::SMALLINT IS NULL OR t.status_id = $1) \
               AND ($2::TEXT IS NULL OR t.kind = $2) \
               AND ($3::BIGINT IS NULL OR t.account_id = $3) \
               AND ($4::TEXT IS NULL OR d.device_id = $4) \
             ORDER BY t.created_at DESC, t.id DESC \
             LIMIT $5 OFFSET $6"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(status_id)
            .bind(&params.kind)
            .bind(params.account_id)
            .bind(&params.device_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Atomically claim the oldest eligible pending task for a device.
    ///
    /// Eligible means: owned by an account of that device, the account is
    /// `logged_in`, and the device heartbeat is younger than
    /// `heartbeat_timeout`. The candidate row is locked with
    /// `FOR UPDATE SKIP LOCKED` and the outer `WHERE` re-checks `pending`,
    /// so two concurrent polls can never both win the same task. Each claim
    /// gets a fresh `claim_token` that reports must echo.
    pub async fn claim_next(
        pool: &PgPool,
        device_id: &str,
        heartbeat_timeout: Duration,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks \
             SET status_id = $2, started_at = NOW(), claimed_by = $1, claim_token = $6, \
                 progress = 0, error_message = NULL, completed_at = NULL \
             WHERE id = ( \
                 SELECT t.id FROM tasks t \
                 JOIN accounts a ON a.id = t.account_id \
                 JOIN devices d ON d.id = a.device_id \
                 WHERE d.device_id = $1 \
                   AND t.status_id = $3 \
                   AND a.login_status_id = $4 \
                   AND d.last_heartbeat_at > NOW() - make_interval(secs => $5) \
                 ORDER BY t.created_at ASC, t.id ASC \
                 LIMIT 1 \
                 FOR UPDATE OF t SKIP LOCKED \
             ) AND status_id = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(device_id)
            .bind(TaskStatus::Running.id())
            .bind(TaskStatus::Pending.id())
            .bind(LoginStatus::LoggedIn.id())
            .bind(heartbeat_timeout.as_secs_f64())
            .bind(Uuid::new_v4())
            .fetch_optional(pool)
            .await
    }

    /// Move a running task to `completed` or `failed`.
    ///
    /// Only applies while the task is `running` under the claim identified
    /// by `report.device_id` and `report.claim_token`; otherwise returns
    /// `None` and changes nothing, so duplicate or late reports (including
    /// one from a run whose claim was since recycled) are harmless. An
    /// `auth_failed` report also forces the owning account to `expired` in
    /// the same transaction.
    pub async fn report_result(
        pool: &PgPool,
        task_id: DbId,
        report: &TaskReport,
    ) -> Result<Option<Task>, sqlx::Error> {
        let (target, error_message) = if report.success {
            (TaskStatus::Completed, None)
        } else {
            let message = report
                .error_message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(DEFAULT_FAILURE_MESSAGE);
            (TaskStatus::Failed, Some(message))
        };

        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE tasks \
             SET status_id = $3, error_message = $4, completed_at = NOW(), \
                 progress = CASE WHEN $5 THEN 100 ELSE COALESCE($6, progress) END \
             WHERE id = $1 AND status_id = $7 AND claimed_by = $2 AND claim_token = $8 \
             RETURNING {COLUMNS}"
        );
        let task = sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .bind(&report.device_id)
            .bind(target.id())
            .bind(error_message)
            .bind(report.success)
            .bind(report.progress.map(clamp_progress))
            .bind(TaskStatus::Running.id())
            .bind(report.claim_token)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(task) = &task {
            if report.auth_failed {
                sqlx::query("UPDATE accounts SET login_status_id = $2 WHERE id = $1")
                    .bind(task.account_id)
                    .bind(LoginStatus::Expired.id())
                    .execute(&mut *tx)
                    .await?;
                tracing::warn!(
                    task_id,
                    account_id = task.account_id,
                    "Account session rejected by platform, marked expired",
                );
            }
        }

        tx.commit().await?;
        Ok(task)
    }

    /// Record intermediate progress for a running task under the claim
    /// `(device_id, claim_token)`.
    ///
    /// Returns `false` when the task is not running under that claim.
    pub async fn report_progress(
        pool: &PgPool,
        task_id: DbId,
        device_id: &str,
        claim_token: Uuid,
        progress: i16,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE tasks SET progress = $3 \
             WHERE id = $1 AND status_id = $4 AND claimed_by = $2 AND claim_token = $5",
        )
        .bind(task_id)
        .bind(device_id)
        .bind(clamp_progress(progress))
        .bind(TaskStatus::Running.id())
        .bind(claim_token)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Requeue one running task regardless of its age.
    ///
    /// The task returns to `pending` with `retry_count + 1`, or is failed if
    /// it already reached `retry_ceiling`. Returns `None` when the task is
    /// not running.
    pub async fn requeue(
        pool: &PgPool,
        task_id: DbId,
        retry_ceiling: i32,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET {REQUEUE_SET} \
             WHERE id = $1 AND status_id = $6 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(task_id)
            .bind(retry_ceiling)
            .bind(TaskStatus::Pending.id())
            .bind(TaskStatus::Failed.id())
            .bind(STALE_RETRY_EXHAUSTED)
            .bind(TaskStatus::Running.id())
            .fetch_optional(pool)
            .await
    }

    /// Requeue every task that has been running longer than `stale_after`
    /// on a device that has since gone offline.
    ///
    /// A claimer that still heartbeats within `heartbeat_timeout` keeps its
    /// task however long the run takes; operators can force it back with
    /// [`TaskRepo::requeue`].
    pub async fn requeue_stale(
        pool: &PgPool,
        stale_after: Duration,
        heartbeat_timeout: Duration,
        retry_ceiling: i32,
    ) -> Result<StaleSweep, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET {REQUEUE_SET} \
             WHERE status_id = $6 \
               AND started_at < NOW() - make_interval(secs => $1) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM devices d \
                   WHERE d.device_id = tasks.claimed_by \
                     AND d.last_heartbeat_at > NOW() - make_interval(secs => $7) \
               ) \
             RETURNING id, status_id"
        );
        let rows: Vec<(DbId, StatusId)> = sqlx::query_as(&query)
            .bind(stale_after.as_secs_f64())
            .bind(retry_ceiling)
            .bind(TaskStatus::Pending.id())
            .bind(TaskStatus::Failed.id())
            .bind(STALE_RETRY_EXHAUSTED)
            .bind(TaskStatus::Running.id())
            .bind(heartbeat_timeout.as_secs_f64())
            .fetch_all(pool)
            .await?;

        let mut sweep = StaleSweep::default();
        for (id, status_id) in rows {
            if status_id == TaskStatus::Failed.id() {
                sweep.failed.push(id);
            } else {
                sweep.requeued.push(id);
            }
        }
        Ok(sweep)
    }

    /// Count tasks per status.
    pub async fn stats(pool: &PgPool) -> Result<TaskStats, sqlx::Error> {
        let rows: Vec<(StatusId, i64)> =
            sqlx::query_as("SELECT status_id, COUNT(*) FROM tasks GROUP BY status_id")
                .fetch_all(pool)
                .await?;

        let mut stats = TaskStats::default();
        for (status_id, count) in rows {
            match TaskStatus::from_id(status_id) {
                Some(TaskStatus::Pending) => stats.pending = count,
                Some(TaskStatus::Running) => stats.running = count,
                Some(TaskStatus::Completed) => stats.completed = count,
                Some(TaskStatus::Failed) => stats.failed = count,
                None => {}
            }
        }
        Ok(stats)
    }
}
