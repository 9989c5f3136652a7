use fleet_core::config::TranscodeConfig;
use fleet_worker::queue::TranscodeQueue;
use fleet_worker::runner::{RunnerConfig, TranscodeRunner};
use fleet_worker::supervisor::AUTOSTARTED_ENV;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleet_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let transcode = TranscodeConfig::from_env().expect("Invalid transcode configuration");
    let runner_config = RunnerConfig::from_env().expect("Invalid worker configuration");
    let autostarted = std::env::var(AUTOSTARTED_ENV).is_ok_and(|v| v == "1");
    let worker_id = fleet_worker::worker_identity();
    tracing::info!(
        worker_id = %worker_id,
        autostarted,
        lease_timeout_secs = transcode.lease_timeout.as_secs(),
        "Loaded worker configuration",
    );

    // --- Database ---
    // Migrations belong to the API server; the worker only needs the schema
    // to exist.
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = fleet_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    fleet_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    // --- Runner ---
    let queue = TranscodeQueue::new(pool.clone(), &transcode);
    let runner = TranscodeRunner::new(queue, worker_id, runner_config);

    let cancel = CancellationToken::new();
    let runner_cancel = cancel.clone();
    let handle = tokio::spawn(async move { runner.run(runner_cancel).await });

    shutdown_signal().await;
    cancel.cancel();

    // An in-flight transcode may take a while; wait for it so its result
    // is recorded instead of leaving the lease to expire.
    if tokio::time::timeout(transcode.lease_timeout, handle)
        .await
        .is_err()
    {
        tracing::warn!("Timed out waiting for the in-flight transcode");
    }

    pool.close().await;
    tracing::info!("Worker shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), finishing current job");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, finishing current job");
        }
    }
}
