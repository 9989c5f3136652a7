//! End-to-end queue flow as seen by workers.

use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;
use fleet_core::config::TranscodeConfig;
use fleet_core::transcode::{output_path_for, MediaKind};
use fleet_db::models::material::{Material, NewMaterial};
use fleet_db::models::status::{MaterialStatus, TranscodeStatus};
use fleet_db::repositories::{MaterialRepo, TranscodeRepo};
use fleet_worker::queue::{FailOutcome, TranscodeQueue};
use fleet_worker::runner::{RunnerConfig, TranscodeRunner};
use sqlx::PgPool;

fn queue(pool: &PgPool, max_attempts: i32) -> TranscodeQueue {
    TranscodeQueue::new(
        pool.clone(),
        &TranscodeConfig {
            max_attempts,
            ..TranscodeConfig::default()
        },
    )
}

async fn material(pool: &PgPool) -> Material {
    MaterialRepo::create(
        pool,
        &NewMaterial {
            name: "promo".into(),
            kind: MediaKind::Video,
            status: MaterialStatus::Processing,
            original_path: "uploads/promo.mov".into(),
            path: None,
            meta_json: None,
            duration_secs: None,
            width: None,
            height: None,
            size_bytes: None,
        },
    )
    .await
    .unwrap()
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn failed_attempt_is_retried_by_another_worker(pool: PgPool) {
    let queue = queue(&pool, 3);
    let material = material(&pool).await;
    let output = output_path_for(material.id, &material.original_path, MediaKind::Video);
    let task = queue
        .enqueue(material.id, &material.original_path, &output, MediaKind::Video)
        .await
        .unwrap();

    let leased = queue.lease("host-a:1").await.unwrap().unwrap();
    assert_eq!(leased.id, task.id);
    assert!(queue.lease("host-b:2").await.unwrap().is_none());

    let outcome = queue.fail(task.id, "host-a:1", "ffmpeg crashed").await.unwrap();
    assert_eq!(outcome, FailOutcome::Retrying { attempts: 1, max_attempts: 3 });

    let retried = queue.lease("host-b:2").await.unwrap().unwrap();
    assert_eq!(retried.id, task.id);
    assert_eq!(retried.attempts, 1);

    assert!(queue.complete(task.id, "host-b:2", &output).await.unwrap());
    // The first worker's late report changes nothing.
    assert_eq!(
        queue.fail(task.id, "host-a:1", "late").await.unwrap(),
        FailOutcome::LeaseLost
    );

    let done = TranscodeRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(done.status_id, TranscodeStatus::Done.id());
    assert_eq!(done.progress, 100);

    let ready = MaterialRepo::find_by_id(&pool, material.id).await.unwrap().unwrap();
    assert_eq!(ready.status_id, MaterialStatus::Ready.id());
    assert_eq!(ready.path.as_deref(), Some(output.as_str()));
    assert!(!queue.has_pending_work().await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn error_text_keeps_the_tail(pool: PgPool) {
    let queue = queue(&pool, 1);
    let material = material(&pool).await;
    let task = queue
        .enqueue(material.id, "in.mov", "out.mp4", MediaKind::Video)
        .await
        .unwrap();
    queue.lease("w").await.unwrap().unwrap();

    let long = format!("{}final line", "x".repeat(20_000));
    let outcome = queue.fail(task.id, "w", &long).await.unwrap();
    assert_eq!(outcome, FailOutcome::Exhausted { attempts: 1 });

    let failed = TranscodeRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    let message = failed.error_message.unwrap();
    assert_eq!(message.chars().count(), 8000);
    assert!(message.ends_with("final line"));

    let errored = MaterialRepo::find_by_id(&pool, material.id).await.unwrap().unwrap();
    assert_eq!(errored.status_id, MaterialStatus::Error.id());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn missing_input_is_recorded_as_a_failed_attempt(pool: PgPool) {
    let media_root = tempfile::tempdir().unwrap();
    let queue = queue(&pool, 2);
    let material = material(&pool).await;
    let task = queue
        .enqueue(material.id, "uploads/absent.mov", "transcoded/out.mp4", MediaKind::Video)
        .await
        .unwrap();

    let runner = TranscodeRunner::new(
        queue.clone(),
        "runner:1".into(),
        RunnerConfig {
            media_root: media_root.path().to_path_buf(),
            idle_sleep: Duration::from_millis(10),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        },
    );

    assert!(runner.run_once().await.unwrap());
    let after = TranscodeRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(after.status_id, TranscodeStatus::Pending.id());
    assert_eq!(after.attempts, 1);
    assert_matches!(after.error_message.as_deref(), Some(m) if m.starts_with("input file not found"));

    assert!(runner.run_once().await.unwrap());
    let after = TranscodeRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(after.status_id, TranscodeStatus::Failed.id());

    // Exhausted tasks are never leased again.
    assert!(!runner.run_once().await.unwrap());
}

#[cfg(unix)]
#[sqlx::test(migrations = "../../db/migrations")]
async fn input_of_unknown_duration_still_transcodes(pool: PgPool) {
    let media_root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(media_root.path().join("uploads")).unwrap();
    std::fs::write(media_root.path().join("uploads/promo.mov"), b"not really a movie").unwrap();

    let queue = queue(&pool, 3);
    let material = material(&pool).await;
    let task = queue
        .enqueue(material.id, "uploads/promo.mov", "transcoded/promo.mp4", MediaKind::Video)
        .await
        .unwrap();

    // ffprobe always fails, ffmpeg always succeeds.
    let runner = TranscodeRunner::new(
        queue.clone(),
        "runner:1".into(),
        RunnerConfig {
            media_root: media_root.path().to_path_buf(),
            idle_sleep: Duration::from_millis(10),
            ffmpeg: PathBuf::from("true"),
            ffprobe: PathBuf::from("false"),
        },
    );

    assert!(runner.run_once().await.unwrap());
    let after = TranscodeRepo::find_by_id(&pool, task.id).await.unwrap().unwrap();
    assert_eq!(after.status_id, TranscodeStatus::Done.id());
    assert_eq!(after.attempts, 0);

    let ready = MaterialRepo::find_by_id(&pool, material.id).await.unwrap().unwrap();
    assert_eq!(ready.status_id, MaterialStatus::Ready.id());
    assert_eq!(ready.path.as_deref(), Some("transcoded/promo.mp4"));
}
