//! Lease protocol of `TranscodeRepo` against a real database.

mod common;

use std::time::Duration;

use common::seed_material;
use fleet_core::transcode::MediaKind;
use fleet_db::models::material::{Material, NewMaterial};
use fleet_db::models::status::{MaterialStatus, TranscodeStatus};
use fleet_db::models::transcode::{EnqueueTranscode, TranscodeTask};
use fleet_db::repositories::transcode_repo::LEASE_EXPIRED_MESSAGE;
use fleet_db::repositories::{MaterialRepo, TranscodeRepo};
use sqlx::PgPool;

const LEASE: Duration = Duration::from_secs(1800);

async fn enqueue(pool: &PgPool, material: &Material, max_attempts: i32) -> TranscodeTask {
    TranscodeRepo::enqueue(
        pool,
        &EnqueueTranscode {
            material_id: material.id,
            input_path: material.original_path.clone(),
            output_path: format!("transcoded/{}.mp4", material.id),
            kind: MediaKind::Video,
            max_attempts,
        },
    )
    .await
    .unwrap()
}

async fn backdate_lease(pool: &PgPool, id: i64, secs: f64) {
    sqlx::query(
        "UPDATE transcode_tasks SET locked_at = NOW() - make_interval(secs => $2) WHERE id = $1",
    )
    .bind(id)
    .bind(secs)
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_starts_pending_with_no_attempts(pool: PgPool) {
    let material = seed_material(&pool, "clip").await;
    let task = enqueue(&pool, &material, 3).await;
    assert_eq!(task.status_id, TranscodeStatus::Pending.id());
    assert_eq!(task.attempts, 0);
    assert_eq!(task.max_attempts, 3);
    assert!(task.locked_by.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn active_lease_is_never_handed_out_twice(pool: PgPool) {
    let material = seed_material(&pool, "clip").await;
    let task = enqueue(&pool, &material, 3).await;

    let leased = TranscodeRepo::lease(&pool, "w1", LEASE).await.unwrap().unwrap();
    assert_eq!(leased.id, task.id);
    assert_eq!(leased.locked_by.as_deref(), Some("w1"));
    assert!(leased.locked_at.is_some());

    assert!(TranscodeRepo::lease(&pool, "w2", LEASE).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_leases_split_distinct_tasks(pool: PgPool) {
    let clip = seed_material(&pool, "clip").await;
    let promo = seed_material(&pool, "promo").await;
    enqueue(&pool, &clip, 3).await;
    enqueue(&pool, &promo, 3).await;

    let workers = ["w1", "w2", "w3", "w4"];
    let leases = workers.iter().map(|w| TranscodeRepo::lease(&pool, w, LEASE));
    let results = futures::future::join_all(leases).await;

    let mut ids: Vec<i64> = results
        .into_iter()
        .filter_map(|r| r.unwrap())
        .map(|t| t.id)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 2, "each task leased exactly once");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn expired_lease_is_reclaimed_and_old_holder_rejected(pool: PgPool) {
    let material = seed_material(&pool, "clip").await;
    let task = enqueue(&pool, &material, 3).await;
    TranscodeRepo::lease(&pool, "w1", LEASE).await.unwrap().unwrap();
    backdate_lease(&pool, task.id, 1801.0).await;

    let reclaimed = TranscodeRepo::lease(&pool, "w2", LEASE).await.unwrap().unwrap();
    assert_eq!(reclaimed.id, task.id);
    assert_eq!(reclaimed.locked_by.as_deref(), Some("w2"));
    assert_eq!(reclaimed.attempts, 1, "the abandoned run counts as an attempt");
    assert_eq!(reclaimed.error_message.as_deref(), Some(LEASE_EXPIRED_MESSAGE));

    let stale = TranscodeRepo::complete(&pool, task.id, "w1", "out.mp4").await.unwrap();
    assert!(stale.is_none());
    assert!(!TranscodeRepo::update_progress(&pool, task.id, "w1", 50).await.unwrap());

    let done = TranscodeRepo::complete(&pool, task.id, "w2", "transcoded/final.mp4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status_id, TranscodeStatus::Done.id());
    assert_eq!(done.progress, 100);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn input_that_kills_every_worker_runs_out_of_attempts(pool: PgPool) {
    let material = seed_material(&pool, "poison").await;
    let task = enqueue(&pool, &material, 3).await;

    TranscodeRepo::lease(&pool, "w0", LEASE).await.unwrap().unwrap();
    for (worker, expected_attempts) in [("w1", 1), ("w2", 2)] {
        backdate_lease(&pool, task.id, 1801.0).await;
        let reclaimed = TranscodeRepo::lease(&pool, worker, LEASE).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, task.id);
        assert_eq!(reclaimed.attempts, expected_attempts);
    }

    // The third abandoned run uses up the budget: failed, not leased.
    backdate_lease(&pool, task.id, 1801.0).await;
    assert!(TranscodeRepo::lease(&pool, "w3", LEASE).await.unwrap().is_none());

    let stored = TranscodeRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, TranscodeStatus::Failed.id());
    assert_eq!(stored.attempts, 3);
    assert!(stored.locked_by.is_none());
    let material = MaterialRepo::find_by_id(&pool, material.id).await.unwrap().unwrap();
    assert_eq!(material.status_id, MaterialStatus::Error.id());
    assert!(!TranscodeRepo::has_pending_work(&pool).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn progress_renews_the_lease(pool: PgPool) {
    let material = seed_material(&pool, "long").await;
    let task = enqueue(&pool, &material, 3).await;
    TranscodeRepo::lease(&pool, "w1", LEASE).await.unwrap().unwrap();

    // Past the lease timeout, but the holder writes progress before anyone
    // else leases.
    backdate_lease(&pool, task.id, 1801.0).await;
    assert!(TranscodeRepo::update_progress(&pool, task.id, "w1", 40).await.unwrap());

    assert!(TranscodeRepo::lease(&pool, "w2", LEASE).await.unwrap().is_none());
    let stored = TranscodeRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(stored.locked_by.as_deref(), Some("w1"));
    assert_eq!(stored.progress, 40);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failing_the_last_attempt_fails_task_and_material(pool: PgPool) {
    let material = seed_material(&pool, "clip").await;
    let task = enqueue(&pool, &material, 3).await;

    for expected_attempts in 1..=2 {
        TranscodeRepo::lease(&pool, "w1", LEASE).await.unwrap().unwrap();
        let retried = TranscodeRepo::fail(&pool, task.id, "w1", "boom").await.unwrap().unwrap();
        assert_eq!(retried.status_id, TranscodeStatus::Pending.id());
        assert_eq!(retried.attempts, expected_attempts);
        assert!(retried.locked_by.is_none());
    }

    TranscodeRepo::lease(&pool, "w1", LEASE).await.unwrap().unwrap();
    let failed = TranscodeRepo::fail(&pool, task.id, "w1", "boom").await.unwrap().unwrap();
    assert_eq!(failed.status_id, TranscodeStatus::Failed.id());
    assert_eq!(failed.attempts, 3);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));

    let material = MaterialRepo::find_by_id(&pool, material.id).await.unwrap().unwrap();
    assert_eq!(material.status_id, MaterialStatus::Error.id());

    assert!(TranscodeRepo::lease(&pool, "w1", LEASE).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn fail_from_non_holder_changes_nothing(pool: PgPool) {
    let material = seed_material(&pool, "clip").await;
    let task = enqueue(&pool, &material, 3).await;
    TranscodeRepo::lease(&pool, "w1", LEASE).await.unwrap().unwrap();

    assert!(TranscodeRepo::fail(&pool, task.id, "w2", "nope").await.unwrap().is_none());
    let stored = TranscodeRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(stored.attempts, 0);
    assert_eq!(stored.status_id, TranscodeStatus::Running.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn pending_work_tracks_queue_and_processing_materials(pool: PgPool) {
    assert!(!TranscodeRepo::has_pending_work(&pool).await.unwrap());

    let material = seed_material(&pool, "clip").await;
    assert!(TranscodeRepo::has_pending_work(&pool).await.unwrap());

    let task = enqueue(&pool, &material, 1).await;
    TranscodeRepo::lease(&pool, "w1", LEASE).await.unwrap().unwrap();
    TranscodeRepo::complete(&pool, task.id, "w1", "transcoded/clip.mp4")
        .await
        .unwrap()
        .unwrap();

    assert!(!TranscodeRepo::has_pending_work(&pool).await.unwrap());
    let stats = TranscodeRepo::stats(&pool).await.unwrap();
    assert_eq!(stats.done, 1);
    assert_eq!(stats.pending, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn material_and_first_transcode_commit_together(pool: PgPool) {
    let input = NewMaterial {
        name: "promo".into(),
        kind: MediaKind::Video,
        status: MaterialStatus::Ready,
        original_path: "uploads/promo.mov".into(),
        path: None,
        meta_json: None,
        duration_secs: None,
        width: None,
        height: None,
        size_bytes: None,
    };
    let (material, task) = MaterialRepo::create_with_transcode(&pool, &input, 2).await.unwrap();

    assert_eq!(material.status_id, MaterialStatus::Processing.id());
    assert_eq!(task.material_id, material.id);
    assert_eq!(task.input_path, "uploads/promo.mov");
    assert_eq!(task.output_path, format!("transcoded/{}_promo.mp4", material.id));
    assert_eq!(task.max_attempts, 2);
    assert_eq!(task.status_id, TranscodeStatus::Pending.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn retranscode_refuses_a_second_active_entry(pool: PgPool) {
    let material = seed_material(&pool, "clip").await;
    let task = enqueue(&pool, &material, 3).await;
    TranscodeRepo::lease(&pool, "w1", LEASE).await.unwrap().unwrap();
    TranscodeRepo::complete(&pool, task.id, "w1", &task.output_path)
        .await
        .unwrap()
        .unwrap();

    let (again, retry) = MaterialRepo::retranscode(&pool, material.id, 3)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.status_id, MaterialStatus::Processing.id());
    assert_eq!(again.path.as_deref(), Some(task.output_path.as_str()));
    assert_eq!(retry.attempts, 0);

    let err = MaterialRepo::retranscode(&pool, material.id, 3).await.unwrap_err();
    let db_err = err.as_database_error().expect("database error");
    assert_eq!(db_err.constraint(), Some("uq_transcode_tasks_active_material"));

    let active: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM transcode_tasks WHERE material_id = $1 AND status_id IN (1, 2)",
    )
    .bind(material.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(active, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn retranscode_of_missing_material_is_none(pool: PgPool) {
    assert!(MaterialRepo::retranscode(&pool, 999, 3).await.unwrap().is_none());
}
