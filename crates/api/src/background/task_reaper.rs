//! Periodic stale-task sweep.
//!
//! A device that crashes mid-task never reports, leaving the task
//! `running`. This loop hands such tasks back to the queue (or fails them
//! at the retry ceiling) every `TASK_SWEEP_INTERVAL_SECS`.

use tokio_util::sync::CancellationToken;

use crate::engine::dispatcher::TaskDispatcher;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(dispatcher: TaskDispatcher, cancel: CancellationToken) {
    let interval_secs = dispatcher.config().sweep_interval.as_secs();
    tracing::info!(
        interval_secs,
        stale_after_secs = dispatcher.config().task_stale_after.as_secs(),
        retry_ceiling = dispatcher.config().task_retry_ceiling,
        "Task reaper started"
    );

    let mut interval = tokio::time::interval(dispatcher.config().sweep_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Task reaper stopping");
                break;
            }
            _ = interval.tick() => {
                match dispatcher.requeue_stale().await {
                    Ok(sweep) if sweep.requeued.is_empty() && sweep.failed.is_empty() => {
                        tracing::debug!("Task reaper: nothing stale");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Task reaper: sweep failed");
                    }
                }
            }
        }
    }
}
