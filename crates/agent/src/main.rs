//! `fleet-agent` -- on-device dispatch daemon.
//!
//! Registers this device with the center, keeps it alive with periodic
//! heartbeats, and executes claimed tasks through the configured
//! automation program. See [`AgentConfig::from_env`] for the environment
//! variables it reads.

use std::sync::Arc;

use fleet_agent::client::CenterClient;
use fleet_agent::config::AgentConfig;
use fleet_agent::executor::{AutomationExecutor, CommandExecutor, UnconfiguredExecutor};
use fleet_agent::identity;
use fleet_agent::runner::Agent;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleet_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid agent configuration");
        std::process::exit(1);
    });

    let device_id = match &config.device_id {
        Some(id) => id.clone(),
        None => identity::load_or_create(&config.id_file).unwrap_or_else(|e| {
            tracing::error!(error = %e, path = %config.id_file.display(), "Cannot load device id");
            std::process::exit(1);
        }),
    };

    let executor: Arc<dyn AutomationExecutor> = match &config.executor_command {
        Some(program) => Arc::new(CommandExecutor::new(
            program.clone(),
            config.executor_args.clone(),
            config.executor_timeout,
        )),
        None => {
            tracing::warn!("EXECUTOR_COMMAND is not set, claimed tasks will be reported failed");
            Arc::new(UnconfiguredExecutor)
        }
    };

    tracing::info!(
        device_id = %device_id,
        center_url = %config.center_url,
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        poll_secs = config.poll_interval.as_secs(),
        "Starting fleet-agent",
    );

    let client = CenterClient::new(config.center_url.trim_end_matches('/').to_string());
    let agent = Arc::new(Agent::new(client, device_id, &config, executor));

    // Heartbeats auto-register, so a failed first registration is not fatal.
    if let Err(e) = agent.register().await {
        tracing::warn!(error = %e, "Initial registration failed, relying on heartbeat");
    }

    let cancel = CancellationToken::new();
    let run = tokio::spawn(Arc::clone(&agent).run(cancel.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
    }
    tracing::info!("Shutdown signal received, stopping agent");
    cancel.cancel();

    if let Err(e) = run.await {
        tracing::error!(error = %e, "Agent task panicked");
    }
    tracing::info!("fleet-agent stopped");
}
