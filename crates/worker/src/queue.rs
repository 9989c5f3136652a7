//! Transcode queue service.
//!
//! Thin policy layer over [`TranscodeRepo`]: it carries the lease timeout
//! and attempt budget from configuration, trims error text, and turns the
//! repository's optional rows into explicit outcomes.

use std::time::Duration;

use fleet_core::config::TranscodeConfig;
use fleet_core::transcode::{truncate_error, MediaKind, MAX_ERROR_CHARS};
use fleet_core::types::DbId;
use fleet_db::models::material::{Material, NewMaterial};
use fleet_db::models::status::TranscodeStatus;
use fleet_db::models::transcode::{EnqueueTranscode, TranscodeTask};
use fleet_db::repositories::{MaterialRepo, TranscodeRepo};
use sqlx::PgPool;

/// What happened to a task reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// Back to `pending`; another lease cycle will retry it.
    Retrying { attempts: i32, max_attempts: i32 },
    /// Attempts used up; the task is `failed` and its material `error`.
    Exhausted { attempts: i32 },
    /// The caller no longer held the lease; nothing changed.
    LeaseLost,
}

/// Lease-based transcode queue bound to one pool and one policy.
#[derive(Debug, Clone)]
pub struct TranscodeQueue {
    pool: PgPool,
    lease_timeout: Duration,
    max_attempts: i32,
}

impl TranscodeQueue {
    pub fn new(pool: PgPool, config: &TranscodeConfig) -> Self {
        Self {
            pool,
            lease_timeout: config.lease_timeout,
            max_attempts: config.max_attempts,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Queue a transcode of `input_path` into `output_path` for a material.
    pub async fn enqueue(
        &self,
        material_id: DbId,
        input_path: &str,
        output_path: &str,
        kind: MediaKind,
    ) -> Result<TranscodeTask, sqlx::Error> {
        let task = TranscodeRepo::enqueue(
            &self.pool,
            &EnqueueTranscode {
                material_id,
                input_path: input_path.to_string(),
                output_path: output_path.to_string(),
                kind,
                max_attempts: self.max_attempts,
            },
        )
        .await?;
        tracing::info!(
            transcode_task_id = task.id,
            material_id,
            kind = %kind,
            "Transcode enqueued",
        );
        Ok(task)
    }

    /// Create a material together with its first transcode.
    pub async fn enqueue_new_material(
        &self,
        input: &NewMaterial,
    ) -> Result<(Material, TranscodeTask), sqlx::Error> {
        let (material, task) =
            MaterialRepo::create_with_transcode(&self.pool, input, self.max_attempts).await?;
        tracing::info!(
            transcode_task_id = task.id,
            material_id = material.id,
            kind = %input.kind,
            "Transcode enqueued",
        );
        Ok((material, task))
    }

    /// Queue a fresh transcode of an existing material's original.
    ///
    /// `None` if the material does not exist.
    pub async fn retranscode(
        &self,
        material_id: DbId,
    ) -> Result<Option<(Material, TranscodeTask)>, sqlx::Error> {
        let queued = MaterialRepo::retranscode(&self.pool, material_id, self.max_attempts).await?;
        if let Some((_, task)) = &queued {
            tracing::info!(
                transcode_task_id = task.id,
                material_id,
                kind = %task.kind,
                "Re-transcode enqueued",
            );
        }
        Ok(queued)
    }

    /// Lease the next available task for `worker_id`.
    pub async fn lease(&self, worker_id: &str) -> Result<Option<TranscodeTask>, sqlx::Error> {
        let task = TranscodeRepo::lease(&self.pool, worker_id, self.lease_timeout).await?;
        if let Some(task) = &task {
            tracing::info!(
                transcode_task_id = task.id,
                material_id = task.material_id,
                worker_id,
                attempts = task.attempts,
                "Transcode leased",
            );
        }
        Ok(task)
    }

    /// Finish a leased task. Returns `false` if the lease was lost.
    pub async fn complete(
        &self,
        task_id: DbId,
        worker_id: &str,
        output_path: &str,
    ) -> Result<bool, sqlx::Error> {
        let task = TranscodeRepo::complete(&self.pool, task_id, worker_id, output_path).await?;
        match &task {
            Some(task) => tracing::info!(
                transcode_task_id = task_id,
                material_id = task.material_id,
                worker_id,
                "Transcode completed, material ready",
            ),
            None => tracing::warn!(
                transcode_task_id = task_id,
                worker_id,
                "Completion ignored: lease no longer held",
            ),
        }
        Ok(task.is_some())
    }

    /// Record a failed attempt for a leased task.
    pub async fn fail(
        &self,
        task_id: DbId,
        worker_id: &str,
        error: &str,
    ) -> Result<FailOutcome, sqlx::Error> {
        let error = truncate_error(error, MAX_ERROR_CHARS);
        let Some(task) = TranscodeRepo::fail(&self.pool, task_id, worker_id, &error).await? else {
            tracing::warn!(
                transcode_task_id = task_id,
                worker_id,
                "Failure ignored: lease no longer held",
            );
            return Ok(FailOutcome::LeaseLost);
        };

        if task.status_id == TranscodeStatus::Failed.id() {
            tracing::error!(
                transcode_task_id = task_id,
                material_id = task.material_id,
                attempts = task.attempts,
                "Transcode failed permanently, material marked error",
            );
            Ok(FailOutcome::Exhausted {
                attempts: task.attempts,
            })
        } else {
            tracing::warn!(
                transcode_task_id = task_id,
                attempts = task.attempts,
                max_attempts = task.max_attempts,
                "Transcode attempt failed, requeued",
            );
            Ok(FailOutcome::Retrying {
                attempts: task.attempts,
                max_attempts: task.max_attempts,
            })
        }
    }

    /// Record progress while `worker_id` holds the lease.
    pub async fn update_progress(
        &self,
        task_id: DbId,
        worker_id: &str,
        progress: i16,
    ) -> Result<bool, sqlx::Error> {
        TranscodeRepo::update_progress(&self.pool, task_id, worker_id, progress).await
    }

    /// Whether a worker would currently find anything to do.
    pub async fn has_pending_work(&self) -> Result<bool, sqlx::Error> {
        TranscodeRepo::has_pending_work(&self.pool).await
    }
}
