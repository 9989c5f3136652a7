use std::sync::Arc;

use fleet_worker::queue::TranscodeQueue;
use fleet_worker::supervisor::WorkerSupervisor;

use crate::config::ServerConfig;
use crate::engine::dispatcher::TaskDispatcher;
use crate::engine::registry::DeviceRegistry;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or wraps the pool.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: fleet_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Device liveness view over the pool.
    pub registry: DeviceRegistry,
    /// Task claim/report state machine.
    pub dispatcher: TaskDispatcher,
    /// Transcode queue shared with the worker process.
    pub queue: TranscodeQueue,
    /// Singleton launcher for the transcode worker.
    pub supervisor: Arc<WorkerSupervisor>,
}

impl AppState {
    pub fn new(pool: fleet_db::DbPool, config: ServerConfig) -> Self {
        let registry = DeviceRegistry::new(pool.clone(), config.dispatch.heartbeat_timeout);
        let dispatcher = TaskDispatcher::new(pool.clone(), config.dispatch.clone());
        let queue = TranscodeQueue::new(pool.clone(), &config.transcode);
        let supervisor = Arc::new(WorkerSupervisor::new(config.supervisor.clone()));
        Self {
            pool,
            config: Arc::new(config),
            registry,
            dispatcher,
            queue,
            supervisor,
        }
    }
}
