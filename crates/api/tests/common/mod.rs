#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use fleet_core::config::{DispatchConfig, TranscodeConfig};
use fleet_worker::supervisor::SupervisorConfig;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use fleet_api::config::ServerConfig;
use fleet_api::routes;
use fleet_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
///
/// The config reports a production deployment so worker autostart never
/// spawns a process, and the media root points at a directory that does
/// not exist, so probes fail fast.
pub fn test_config() -> ServerConfig {
    let scratch = std::env::temp_dir().join("fleet-api-tests");
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        dispatch: DispatchConfig::default(),
        transcode: TranscodeConfig {
            production: true,
            ..TranscodeConfig::default()
        },
        media_root: scratch.join("media"),
        ffprobe: PathBuf::from("ffprobe"),
        supervisor: SupervisorConfig {
            state_dir: scratch.join("state"),
            worker_bin: PathBuf::from("fleet-worker"),
            worker_args: Vec::new(),
        },
    }
}

/// Build the full application router with all middleware layers.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack production uses.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, test_config())
}

pub fn build_test_app_with(pool: PgPool, config: ServerConfig) -> Router {
    let state = AppState::new(pool, config);

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send_json(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send_json(app, Method::PUT, uri, body).await
}

pub async fn post_empty(app: Router, uri: &str) -> Response {
    app.oneshot(
        Request::post(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn send_json(app: Router, method: Method, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Seeding through the API
// ---------------------------------------------------------------------------

/// Register a device and a logged-in account on it. Returns the account id.
pub async fn seed_logged_in_account(pool: &PgPool, device_id: &str, name: &str) -> i64 {
    let app = build_test_app(pool.clone());
    let response = post_json(
        app,
        "/api/v1/devices/register",
        serde_json::json!({ "device_id": device_id, "device_name": "phone" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let app = build_test_app(pool.clone());
    let response = post_json(
        app,
        "/api/v1/accounts",
        serde_json::json!({ "device_id": device_id, "account_name": name }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let account_id = body_json(response).await["data"]["id"].as_i64().unwrap();

    let app = build_test_app(pool.clone());
    let response = put_json(
        app,
        &format!("/api/v1/accounts/{account_id}/login-status"),
        serde_json::json!({ "login_status": "logged_in" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    account_id
}
