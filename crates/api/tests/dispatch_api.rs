//! Device registration, claim and report over HTTP.

mod common;

use axum::http::StatusCode;
use axum::Router;
use common::{body_json, get, post_empty, post_json, seed_logged_in_account};
use serde_json::json;
use sqlx::PgPool;

async fn create_chat_task(pool: &PgPool, account_id: i64, message: &str) -> i64 {
    let app = common::build_test_app(pool.clone());
    let response = post_json(
        app,
        "/api/v1/tasks",
        json!({
            "account_id": account_id,
            "kind": "chat",
            "target_user": "fan_01",
            "message": message,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status_id"], 1);
    json["data"]["id"].as_i64().unwrap()
}

/// Claim the next task for `device_id` and return its claim token.
async fn claim_token(app: Router, device_id: &str) -> serde_json::Value {
    let json = body_json(get(app, &format!("/api/v1/devices/{device_id}/tasks/next")).await).await;
    let token = json["data"]["claim_token"].clone();
    assert!(token.is_string(), "no task claimed: {json}");
    token
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn registered_device_is_online(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let response = post_json(
        app,
        "/api/v1/devices/register",
        json!({ "device_id": "phone-1", "device_name": "Pixel", "ip_address": "10.0.0.9" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["device_id"], "phone-1");
    assert_eq!(json["data"]["status"], "online");

    let app = common::build_test_app(pool);
    let json = body_json(get(app, "/api/v1/devices/stats").await).await;
    assert_eq!(json["data"]["total"], 1);
    assert_eq!(json["data"]["online"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn heartbeat_from_unknown_device_registers_it(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    let response = post_empty(app, "/api/v1/devices/phone-new/heartbeat").await;
    assert_eq!(response.status(), StatusCode::OK);

    let app = common::build_test_app(pool);
    let response = get(app, "/api/v1/devices/phone-new").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status"], "online");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn device_views_and_stats_agree_on_liveness(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    post_empty(app, "/api/v1/devices/phone-1/heartbeat").await;

    for (age_secs, expected, online) in [(59.0, "online", 1), (61.0, "offline", 0)] {
        sqlx::query(
            "UPDATE devices SET last_heartbeat_at = NOW() - make_interval(secs => $1) \
             WHERE device_id = 'phone-1'",
        )
        .bind(age_secs)
        .execute(&pool)
        .await
        .unwrap();

        let app = common::build_test_app(pool.clone());
        let json = body_json(get(app, "/api/v1/devices/phone-1").await).await;
        assert_eq!(json["data"]["status"], expected, "age {age_secs}s");

        let app = common::build_test_app(pool.clone());
        let json = body_json(get(app, "/api/v1/devices").await).await;
        assert_eq!(json["data"][0]["status"], expected, "age {age_secs}s");

        let app = common::build_test_app(pool.clone());
        let json = body_json(get(app, "/api/v1/devices/stats").await).await;
        assert_eq!(json["data"]["online"], online, "age {age_secs}s");
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_device_id_is_rejected(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/devices/register",
        json!({ "device_id": "bad id/with slash" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_device_returns_404(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = get(app, "/api/v1/devices/ghost").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_account_on_device_conflicts(pool: PgPool) {
    seed_logged_in_account(&pool, "phone-1", "shop_a").await;

    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/accounts",
        json!({ "device_id": "phone-1", "account_name": "shop_a" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(
        json["error"],
        "This device already has an account with that name on the platform"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_login_status_is_a_bad_request(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;

    let app = common::build_test_app(pool);
    let response = common::put_json(
        app,
        &format!("/api/v1/accounts/{account_id}/login-status"),
        json!({ "login_status": "sleepy" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cookies_are_never_serialized(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;

    let app = common::build_test_app(pool);
    let json = body_json(get(app, &format!("/api/v1/accounts/{account_id}")).await).await;
    assert!(json["data"].get("cookies").is_none());
    assert_eq!(json["data"]["login_status_id"], 3);
}

// ---------------------------------------------------------------------------
// Claim & report
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_then_report_completes_task(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;
    let task_id = create_chat_task(&pool, account_id, "hello").await;

    let app = common::build_test_app(pool.clone());
    let json = body_json(get(app, "/api/v1/devices/phone-1/tasks/next").await).await;
    assert_eq!(json["data"]["id"], task_id);
    assert_eq!(json["data"]["claimed_by"], "phone-1");
    let token = json["data"]["claim_token"].clone();
    assert!(token.is_string());

    // Nothing else is queued.
    let app = common::build_test_app(pool.clone());
    let json = body_json(get(app, "/api/v1/devices/phone-1/tasks/next").await).await;
    assert!(json["data"].is_null());

    let app = common::build_test_app(pool.clone());
    let response = post_json(
        app,
        &format!("/api/v1/tasks/{task_id}/report"),
        json!({ "device_id": "phone-1", "claim_token": token, "success": true }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["outcome"], "accepted");
    assert_eq!(json["data"]["task"]["status_id"], 3);
    assert_eq!(json["data"]["task"]["progress"], 100);

    // A duplicate failure report after completion is a no-op.
    let app = common::build_test_app(pool.clone());
    let response = post_json(
        app,
        &format!("/api/v1/tasks/{task_id}/report"),
        json!({
            "device_id": "phone-1",
            "claim_token": token,
            "success": false,
            "error_message": "late",
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["outcome"], "ignored");

    let app = common::build_test_app(pool);
    let json = body_json(get(app, &format!("/api/v1/tasks/{task_id}")).await).await;
    assert_eq!(json["data"]["status_id"], 3);
    assert!(json["data"]["error_message"].is_null());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn auth_failure_expires_account(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;
    let task_id = create_chat_task(&pool, account_id, "hello").await;

    let app = common::build_test_app(pool.clone());
    let token = claim_token(app, "phone-1").await;

    let app = common::build_test_app(pool.clone());
    post_json(
        app,
        &format!("/api/v1/tasks/{task_id}/report"),
        json!({
            "device_id": "phone-1",
            "claim_token": token,
            "success": false,
            "error_message": "session expired",
            "auth_failed": true,
        }),
    )
    .await;

    let app = common::build_test_app(pool);
    let json = body_json(get(app, &format!("/api/v1/accounts/{account_id}")).await).await;
    assert_eq!(json["data"]["login_status_id"], 4);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn progress_only_applies_for_claimer(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;
    let task_id = create_chat_task(&pool, account_id, "hello").await;

    let app = common::build_test_app(pool.clone());
    let token = claim_token(app, "phone-1").await;

    let app = common::build_test_app(pool.clone());
    let json = body_json(
        post_json(
            app,
            &format!("/api/v1/tasks/{task_id}/progress"),
            json!({ "device_id": "phone-2", "claim_token": token, "progress": 50 }),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["applied"], false);

    let app = common::build_test_app(pool);
    let json = body_json(
        post_json(
            app,
            &format!("/api/v1/tasks/{task_id}/progress"),
            json!({ "device_id": "phone-1", "claim_token": token, "progress": 50 }),
        )
        .await,
    )
    .await;
    assert_eq!(json["data"]["applied"], true);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn requeue_of_pending_task_conflicts(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;
    let task_id = create_chat_task(&pool, account_id, "hello").await;

    let app = common::build_test_app(pool.clone());
    let response = post_empty(app, &format!("/api/v1/tasks/{task_id}/requeue")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let app = common::build_test_app(pool.clone());
    get(app, "/api/v1/devices/phone-1/tasks/next").await;

    let app = common::build_test_app(pool);
    let response = post_empty(app, &format!("/api/v1/tasks/{task_id}/requeue")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status_id"], 1);
    assert_eq!(json["data"]["retry_count"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_payload_and_unknown_account_are_rejected(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;

    let app = common::build_test_app(pool.clone());
    let response = post_json(
        app,
        "/api/v1/tasks",
        json!({ "account_id": account_id, "kind": "chat", "target_user": "x", "message": "  " }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        "/api/v1/tasks",
        json!({ "account_id": 999_999, "kind": "listen", "action": "start" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn task_list_filters_by_status(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;
    create_chat_task(&pool, account_id, "one").await;
    create_chat_task(&pool, account_id, "two").await;

    let app = common::build_test_app(pool.clone());
    get(app, "/api/v1/devices/phone-1/tasks/next").await;

    let app = common::build_test_app(pool.clone());
    let json = body_json(get(app, "/api/v1/tasks?status=pending&device_id=phone-1").await).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let app = common::build_test_app(pool.clone());
    let response = get(app, "/api/v1/tasks?status=bogus").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let app = common::build_test_app(pool);
    let json = body_json(get(app, "/api/v1/tasks/stats").await).await;
    assert_eq!(json["data"]["pending"], 1);
    assert_eq!(json["data"]["running"], 1);
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn messages_list_oldest_first_per_peer(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;

    for (peer, body, sent_at) in [
        ("fan_01", "second", "2026-01-01T10:01:00Z"),
        ("fan_01", "first", "2026-01-01T10:00:00Z"),
        ("fan_02", "other", "2026-01-01T09:00:00Z"),
    ] {
        let app = common::build_test_app(pool.clone());
        let response = post_json(
            app,
            "/api/v1/messages",
            json!({ "account_id": account_id, "peer": peer, "body": body, "sent_at": sent_at }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let app = common::build_test_app(pool);
    let json = body_json(
        get(app, &format!("/api/v1/messages?account_id={account_id}&peer=fan_01")).await,
    )
    .await;
    let bodies: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, ["first", "second"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn report_for_a_recycled_claim_is_ignored(pool: PgPool) {
    let account_id = seed_logged_in_account(&pool, "phone-1", "shop_a").await;
    let task_id = create_chat_task(&pool, account_id, "hello").await;

    let app = common::build_test_app(pool.clone());
    let first = claim_token(app, "phone-1").await;

    let app = common::build_test_app(pool.clone());
    let response = post_empty(app, &format!("/api/v1/tasks/{task_id}/requeue")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let app = common::build_test_app(pool.clone());
    let second = claim_token(app, "phone-1").await;
    assert_ne!(first, second);

    // The first run finishes late on the same device.
    let app = common::build_test_app(pool.clone());
    let response = post_json(
        app,
        &format!("/api/v1/tasks/{task_id}/report"),
        json!({ "device_id": "phone-1", "claim_token": first, "success": true }),
    )
    .await;
    assert_eq!(body_json(response).await["data"]["outcome"], "ignored");

    let app = common::build_test_app(pool.clone());
    let json = body_json(get(app, &format!("/api/v1/tasks/{task_id}")).await).await;
    assert_eq!(json["data"]["status_id"], 2);

    let app = common::build_test_app(pool);
    let response = post_json(
        app,
        &format!("/api/v1/tasks/{task_id}/report"),
        json!({ "device_id": "phone-1", "claim_token": second, "success": true }),
    )
    .await;
    assert_eq!(body_json(response).await["data"]["outcome"], "accepted");
}
