//! Shared seed helpers for repository tests.

#![allow(dead_code)]

use fleet_core::task::{ChatPayload, TaskPayload};
use fleet_core::transcode::MediaKind;
use fleet_db::models::account::{Account, CreateAccount};
use fleet_db::models::device::Device;
use fleet_db::models::material::{Material, NewMaterial};
use fleet_db::models::status::{LoginStatus, MaterialStatus};
use fleet_db::models::task::Task;
use fleet_db::repositories::{AccountRepo, DeviceRepo, MaterialRepo, TaskRepo};
use sqlx::PgPool;

pub async fn seed_device(pool: &PgPool, device_id: &str) -> Device {
    DeviceRepo::upsert_heartbeat(pool, device_id, Some("test phone"), Some("10.0.0.2"))
        .await
        .unwrap()
}

pub async fn seed_account(pool: &PgPool, device: &Device, name: &str, status: LoginStatus) -> Account {
    let account = AccountRepo::create(
        pool,
        device.id,
        &CreateAccount {
            device_id: device.device_id.clone(),
            account_name: name.to_string(),
            platform: None,
            cookies: None,
        },
    )
    .await
    .unwrap();
    AccountRepo::set_login_status(pool, account.id, status, None)
        .await
        .unwrap()
        .unwrap()
}

pub fn chat(message: &str) -> TaskPayload {
    TaskPayload::Chat(ChatPayload {
        target_user: "peer".into(),
        message: message.into(),
    })
}

pub async fn seed_task(pool: &PgPool, account: &Account, message: &str) -> Task {
    TaskRepo::create(pool, account.id, &chat(message)).await.unwrap()
}

/// Backdate a device heartbeat by `secs` seconds.
pub async fn age_heartbeat(pool: &PgPool, device_id: &str, secs: f64) {
    sqlx::query(
        "UPDATE devices SET last_heartbeat_at = NOW() - make_interval(secs => $2) \
         WHERE device_id = $1",
    )
    .bind(device_id)
    .bind(secs)
    .execute(pool)
    .await
    .unwrap();
}

/// Backdate a task's `started_at` by `secs` seconds.
pub async fn age_task_claim(pool: &PgPool, task_id: i64, secs: f64) {
    sqlx::query("UPDATE tasks SET started_at = NOW() - make_interval(secs => $2) WHERE id = $1")
        .bind(task_id)
        .bind(secs)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn seed_material(pool: &PgPool, name: &str) -> Material {
    MaterialRepo::create(
        pool,
        &NewMaterial {
            name: name.to_string(),
            kind: MediaKind::Video,
            status: MaterialStatus::Processing,
            original_path: format!("uploads/{name}.mov"),
            path: None,
            meta_json: None,
            duration_secs: Some(10.0),
            width: Some(1080),
            height: Some(1920),
            size_bytes: Some(1024),
        },
    )
    .await
    .unwrap()
}
