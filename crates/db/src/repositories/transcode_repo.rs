//! Repository for the `transcode_tasks` lease queue.
//!
//! A worker leases a row by moving it to `running` with `locked_by` and
//! `locked_at` set. Completion and failure are only accepted from the
//! current lease holder, and each commits the owning material's new state
//! in the same transaction.

use std::time::Duration;

use fleet_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::status::{MaterialStatus, StatusId, TranscodeStatus};
use crate::models::transcode::{EnqueueTranscode, QueueStats, TranscodeListQuery, TranscodeTask};
use crate::repositories::page;

/// Column list for `transcode_tasks` queries.
pub(crate) const COLUMNS: &str = "\
    id, material_id, input_path, output_path, kind, status_id, progress, \
    error_message, attempts, max_attempts, locked_by, locked_at, \
    created_at, updated_at";

/// Error recorded when a worker's lease runs out before it reports.
pub const LEASE_EXPIRED_MESSAGE: &str = "Worker lease expired before the transcode finished";

/// Provides the lease/complete/fail protocol for transcode workers.
pub struct TranscodeRepo;

impl TranscodeRepo {
    /// Add a pending entry with a fresh attempt budget.
    ///
    /// Fails with a `uq_transcode_tasks_active_material` violation while the
    /// material already has a pending or running entry.
    pub async fn enqueue(
        pool: &PgPool,
        input: &EnqueueTranscode,
    ) -> Result<TranscodeTask, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::insert(&mut conn, input).await
    }

    /// [`enqueue`](Self::enqueue) on a caller's connection or transaction.
    pub(crate) async fn insert(
        conn: &mut PgConnection,
        input: &EnqueueTranscode,
    ) -> Result<TranscodeTask, sqlx::Error> {
        let query = format!(
            "INSERT INTO transcode_tasks \
                 (material_id, input_path, output_path, kind, status_id, attempts, max_attempts) \
             VALUES ($1, $2, $3, $4, $5, 0, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TranscodeTask>(&query)
            .bind(input.material_id)
            .bind(&input.input_path)
            .bind(&input.output_path)
            .bind(input.kind.as_str())
            .bind(TranscodeStatus::Pending.id())
            .bind(input.max_attempts)
            .fetch_one(conn)
            .await
    }

    /// Find an entry by its internal ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<TranscodeTask>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM transcode_tasks WHERE id = $1");
        sqlx::query_as::<_, TranscodeTask>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List entries newest first.
    pub async fn list(
        pool: &PgPool,
        status_id: Option<StatusId>,
        params: &TranscodeListQuery,
    ) -> Result<Vec<TranscodeTask>, sqlx::Error> {
        let (limit, offset) = page(params.limit, params.offset);
        let query = format!(
            "SELECT {COLUMNS} FROM transcode_tasks \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1) \
               AND ($2::BIGINT IS NULL OR material_id = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, TranscodeTask>(&query)
            .bind(status_id)
            .bind(params.material_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Lease the oldest available entry for `worker_id`.
    ///
    /// Available means `pending`, or `running` with a lease older than
    /// `lease_timeout` (its worker is presumed dead). Taking over an expired
    /// lease counts the abandoned run as an attempt, so an input that kills
    /// or hangs every worker still runs out of attempts. An expired lease
    /// with no attempt left is failed (and its material marked `error`) in
    /// the same transaction instead of being leased.
    pub async fn lease(
        pool: &PgPool,
        worker_id: &str,
        lease_timeout: Duration,
    ) -> Result<Option<TranscodeTask>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let expired = sqlx::query(
            "WITH expired AS ( \
                 UPDATE transcode_tasks \
                 SET attempts = attempts + 1, status_id = $2, error_message = $3, \
                     progress = 0, locked_by = NULL, locked_at = NULL \
                 WHERE status_id = $1 \
                   AND locked_at < NOW() - make_interval(secs => $4) \
                   AND attempts + 1 >= max_attempts \
                 RETURNING material_id \
             ) \
             UPDATE materials SET status_id = $5 \
             WHERE id IN (SELECT material_id FROM expired)",
        )
        .bind(TranscodeStatus::Running.id())
        .bind(TranscodeStatus::Failed.id())
        .bind(LEASE_EXPIRED_MESSAGE)
        .bind(lease_timeout.as_secs_f64())
        .bind(MaterialStatus::Error.id())
        .execute(&mut *tx)
        .await?;
        if expired.rows_affected() > 0 {
            tracing::warn!(
                materials = expired.rows_affected(),
                "Expired transcode leases had no attempts left, marked failed",
            );
        }

        // `status_id` on the right-hand side of SET is the pre-update value.
        let query = format!(
            "UPDATE transcode_tasks \
             SET status_id = $2, locked_by = $1, locked_at = NOW(), progress = 0, \
                 attempts = CASE WHEN status_id = $2 THEN attempts + 1 ELSE attempts END, \
                 error_message = CASE WHEN status_id = $2 THEN $5 ELSE error_message END \
             WHERE id = ( \
                 SELECT id FROM transcode_tasks \
                 WHERE (status_id = $3 AND attempts < max_attempts) \
                    OR (status_id = $2 \
                        AND locked_at < NOW() - make_interval(secs => $4) \
                        AND attempts + 1 < max_attempts) \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) AND (status_id = $3 \
                    OR (status_id = $2 AND locked_at < NOW() - make_interval(secs => $4))) \
             RETURNING {COLUMNS}"
        );
        let task = sqlx::query_as::<_, TranscodeTask>(&query)
            .bind(worker_id)
            .bind(TranscodeStatus::Running.id())
            .bind(TranscodeStatus::Pending.id())
            .bind(lease_timeout.as_secs_f64())
            .bind(LEASE_EXPIRED_MESSAGE)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(task)
    }

    /// Record progress (clamped to `0..=99`) while `worker_id` holds the
    /// lease. Every write also renews the lease.
    pub async fn update_progress(
        pool: &PgPool,
        id: DbId,
        worker_id: &str,
        progress: i16,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE transcode_tasks SET progress = $3, locked_at = NOW() \
             WHERE id = $1 AND locked_by = $2 AND status_id = $4",
        )
        .bind(id)
        .bind(worker_id)
        .bind(progress.clamp(0, 99))
        .bind(TranscodeStatus::Running.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark the entry `done` and publish `output_path` on its material.
    ///
    /// Returns `None` (and changes nothing) if `worker_id` no longer holds
    /// the lease, e.g. because it expired and another worker took over.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        worker_id: &str,
        output_path: &str,
    ) -> Result<Option<TranscodeTask>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE transcode_tasks \
             SET status_id = $4, progress = 100, output_path = $3, \
                 error_message = NULL, locked_at = NULL \
             WHERE id = $1 AND locked_by = $2 AND status_id = $5 \
             RETURNING {COLUMNS}"
        );
        let task = sqlx::query_as::<_, TranscodeTask>(&query)
            .bind(id)
            .bind(worker_id)
            .bind(output_path)
            .bind(TranscodeStatus::Done.id())
            .bind(TranscodeStatus::Running.id())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(task) = &task {
            sqlx::query("UPDATE materials SET path = $2, status_id = $3 WHERE id = $1")
                .bind(task.material_id)
                .bind(output_path)
                .bind(MaterialStatus::Ready.id())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(task)
    }

    /// Count a failed attempt and release the lease.
    ///
    /// The entry returns to `pending` while `attempts < max_attempts`;
    /// otherwise it becomes `failed` and its material moves to `error`.
    /// Returns `None` if `worker_id` no longer holds the lease.
    pub async fn fail(
        pool: &PgPool,
        id: DbId,
        worker_id: &str,
        error_message: &str,
    ) -> Result<Option<TranscodeTask>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE transcode_tasks \
             SET attempts = attempts + 1, \
                 status_id = CASE WHEN attempts + 1 >= max_attempts THEN $4 ELSE $5 END, \
                 error_message = $3, progress = 0, locked_by = NULL, locked_at = NULL \
             WHERE id = $1 AND locked_by = $2 AND status_id = $6 \
             RETURNING {COLUMNS}"
        );
        let task = sqlx::query_as::<_, TranscodeTask>(&query)
            .bind(id)
            .bind(worker_id)
            .bind(error_message)
            .bind(TranscodeStatus::Failed.id())
            .bind(TranscodeStatus::Pending.id())
            .bind(TranscodeStatus::Running.id())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(task) = &task {
            if task.status_id == TranscodeStatus::Failed.id() {
                sqlx::query("UPDATE materials SET status_id = $2 WHERE id = $1")
                    .bind(task.material_id)
                    .bind(MaterialStatus::Error.id())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(task)
    }

    /// Whether a worker would find anything to do: queue entries pending or
    /// running, or materials still marked `processing`.
    pub async fn has_pending_work(pool: &PgPool) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM transcode_tasks WHERE status_id IN ($1, $2)) \
                 OR EXISTS (SELECT 1 FROM materials WHERE status_id = $3)",
        )
        .bind(TranscodeStatus::Pending.id())
        .bind(TranscodeStatus::Running.id())
        .bind(MaterialStatus::Processing.id())
        .fetch_one(pool)
        .await
    }

    /// Count entries per status.
    pub async fn stats(pool: &PgPool) -> Result<QueueStats, sqlx::Error> {
        let rows: Vec<(StatusId, i64)> = sqlx::query_as(
            "SELECT status_id, COUNT(*) FROM transcode_tasks GROUP BY status_id",
        )
        .fetch_all(pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status_id, count) in rows {
            match TranscodeStatus::from_id(status_id) {
                Some(TranscodeStatus::Pending) => stats.pending = count,
                Some(TranscodeStatus::Running) => stats.running = count,
                Some(TranscodeStatus::Done) => stats.done = count,
                Some(TranscodeStatus::Failed) => stats.failed = count,
                None => {}
            }
        }
        Ok(stats)
    }
}
