//! Repository for the `materials` table.

use fleet_core::transcode::{output_path_for, MediaKind};
use fleet_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::material::{Material, MaterialListQuery, NewMaterial};
use crate::models::status::{MaterialStatus, StatusId};
use crate::models::transcode::{EnqueueTranscode, TranscodeTask};
use crate::repositories::{page, TranscodeRepo};

/// Column list for `materials` queries.
const COLUMNS: &str = "\
    id, name, kind, status_id, original_path, path, meta_json, \
    duration_secs, width, height, size_bytes, created_at, updated_at";

/// Provides CRUD for media materials. Every write that also touches the
/// transcode queue runs in one transaction with it.
pub struct MaterialRepo;

impl MaterialRepo {
    /// Insert a material.
    pub async fn create(pool: &PgPool, input: &NewMaterial) -> Result<Material, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::insert(&mut conn, input, input.status).await
    }

    /// Insert a material in `processing` and queue its first transcode.
    ///
    /// Both rows commit together, so a material never sits in `processing`
    /// without a queue entry that will move it on.
    pub async fn create_with_transcode(
        pool: &PgPool,
        input: &NewMaterial,
        max_attempts: i32,
    ) -> Result<(Material, TranscodeTask), sqlx::Error> {
        let mut tx = pool.begin().await?;
        let material = Self::insert(&mut *tx, input, MaterialStatus::Processing).await?;
        let entry = transcode_of(&material, input.kind, max_attempts);
        let task = TranscodeRepo::insert(&mut *tx, &entry).await?;
        tx.commit().await?;
        Ok((material, task))
    }

    /// Put a material back into `processing` and queue a fresh transcode of
    /// its original, atomically.
    ///
    /// The previous `path` stays playable until the new output lands.
    /// Returns `None` if the material does not exist. A material that
    /// already has a pending or running transcode fails with a
    /// `uq_transcode_tasks_active_material` violation and nothing changes.
    pub async fn retranscode(
        pool: &PgPool,
        id: DbId,
        max_attempts: i32,
    ) -> Result<Option<(Material, TranscodeTask)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE materials SET status_id = $2 WHERE id = $1 RETURNING {COLUMNS}"
        );
        let Some(material) = sqlx::query_as::<_, Material>(&query)
            .bind(id)
            .bind(MaterialStatus::Processing.id())
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let kind: MediaKind = material
            .kind
            .parse()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let entry = transcode_of(&material, kind, max_attempts);
        let task = TranscodeRepo::insert(&mut *tx, &entry).await?;
        tx.commit().await?;
        Ok(Some((material, task)))
    }

    async fn insert(
        conn: &mut PgConnection,
        input: &NewMaterial,
        status: MaterialStatus,
    ) -> Result<Material, sqlx::Error> {
        let query = format!(
            "INSERT INTO materials \
                 (name, kind, status_id, original_path, path, meta_json, \
                  duration_secs, width, height, size_bytes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Material>(&query)
            .bind(&input.name)
            .bind(input.kind.as_str())
            .bind(status.id())
            .bind(&input.original_path)
            .bind(&input.path)
            .bind(&input.meta_json)
            .bind(input.duration_secs)
            .bind(input.width)
            .bind(input.height)
            .bind(input.size_bytes)
            .fetch_one(conn)
            .await
    }

    /// Find a material by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Material>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM materials WHERE id = $1");
        sqlx::query_as::<_, Material>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List materials newest first.
    pub async fn list(
        pool: &PgPool,
        status_id: Option<StatusId>,
        params: &MaterialListQuery,
    ) -> Result<Vec<Material>, sqlx::Error> {
        let (limit, offset) = page(params.limit, params.offset);
        let query = format!(
            "SELECT {COLUMNS} FROM materials \
             WHERE ($1::SMALLINT IS NULL OR status_id = $1) \
               AND ($2::TEXT IS NULL OR kind = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Material>(&query)
            .bind(status_id)
            .bind(&params.kind)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}

/// Queue entry transcoding a material's original into its output slot.
fn transcode_of(material: &Material, kind: MediaKind, max_attempts: i32) -> EnqueueTranscode {
    EnqueueTranscode {
        material_id: material.id,
        input_path: material.original_path.clone(),
        output_path: output_path_for(material.id, &material.original_path, kind),
        kind,
        max_attempts,
    }
}
