//! Heartbeat and poll loops.
//!
//! Two independent loops share one [`Agent`]: the heartbeat keeps the
//! device `online` in the center's view even while a long automation is
//! running, and the poll loop claims one task at a time, executes it and
//! reports the outcome. Every HTTP failure is logged and retried on the
//! next cycle.

use std::sync::Arc;
use std::time::Duration;

use fleet_core::task::ProgressReport;
use fleet_core::types::DbId;
use tokio_util::sync::CancellationToken;

use crate::client::{CenterClient, ClaimedTask, ClientError};
use crate::config::AgentConfig;
use crate::executor::AutomationExecutor;

/// Attempts made to deliver a final report before leaving the task for
/// the center's stale-task sweep.
const REPORT_ATTEMPTS: u32 = 3;

const REPORT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// What a single poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was eligible for this device.
    Idle,
    /// A task ran and the center accepted the report.
    Reported { task_id: DbId, success: bool },
    /// A task ran but the center no longer considered it ours.
    Ignored { task_id: DbId },
    /// A task ran but its report could not be delivered.
    Undelivered { task_id: DbId },
}

pub struct Agent {
    client: CenterClient,
    device_id: String,
    device_name: Option<String>,
    ip_address: Option<String>,
    heartbeat_interval: Duration,
    poll_interval: Duration,
    executor: Arc<dyn AutomationExecutor>,
}

impl Agent {
    pub fn new(
        client: CenterClient,
        device_id: String,
        config: &AgentConfig,
        executor: Arc<dyn AutomationExecutor>,
    ) -> Self {
        Self {
            client,
            device_id,
            device_name: config.device_name.clone(),
            ip_address: config.ip_address.clone(),
            heartbeat_interval: config.heartbeat_interval,
            poll_interval: config.poll_interval,
            executor,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub async fn register(&self) -> Result<(), ClientError> {
        self.client
            .register(
                &self.device_id,
                self.device_name.as_deref(),
                self.ip_address.as_deref(),
            )
            .await
    }

    /// Run both loops until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let heartbeat = tokio::spawn(Arc::clone(&self).heartbeat_loop(cancel.clone()));
        self.poll_loop(cancel).await;
        if let Err(e) = heartbeat.await {
            tracing::error!(error = %e, "Heartbeat loop panicked");
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.heartbeat_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let result = self
                        .client
                        .heartbeat(
                            &self.device_id,
                            self.device_name.as_deref(),
                            self.ip_address.as_deref(),
                        )
                        .await;
                    match result {
                        Ok(()) => tracing::debug!(device_id = %self.device_id, "Heartbeat sent"),
                        Err(e) => tracing::warn!(error = %e, "Heartbeat failed"),
                    }
                }
            }
        }
        tracing::info!("Heartbeat loop stopped");
    }

    async fn poll_loop(&self, cancel: CancellationToken) {
        loop {
            let delay = match self.poll_once().await {
                // Drain the backlog before sleeping again.
                Ok(PollOutcome::Idle) => self.poll_interval,
                Ok(_) => Duration::ZERO,
                Err(e) => {
                    tracing::warn!(error = %e, "Polling for tasks failed");
                    self.poll_interval
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!("Poll loop stopped");
    }

    /// Claim at most one task, execute it and report the result.
    pub async fn poll_once(&self) -> Result<PollOutcome, ClientError> {
        let Some(task) = self.client.claim_next(&self.device_id).await? else {
            return Ok(PollOutcome::Idle);
        };

        tracing::info!(
            task_id = task.id,
            kind = %task.kind,
            account_id = task.account_id,
            retry_count = task.retry_count,
            "Claimed task",
        );

        self.mark_started(&task).await;
        let result = self.executor.execute(&task).await;
        let success = result.success;
        let report = result.into_report(&self.device_id, task.claim_token);

        for attempt in 1..=REPORT_ATTEMPTS {
            match self.client.report(task.id, &report).await {
                Ok(true) => {
                    tracing::info!(task_id = task.id, success, "Task reported");
                    return Ok(PollOutcome::Reported {
                        task_id: task.id,
                        success,
                    });
                }
                Ok(false) => {
                    tracing::warn!(task_id = task.id, "Center ignored the report");
                    return Ok(PollOutcome::Ignored { task_id: task.id });
                }
                Err(e) => {
                    tracing::warn!(task_id = task.id, attempt, error = %e, "Report failed");
                    if attempt < REPORT_ATTEMPTS {
                        tokio::time::sleep(REPORT_RETRY_DELAY).await;
                    }
                }
            }
        }

        tracing::error!(task_id = task.id, "Giving up on report");
        Ok(PollOutcome::Undelivered { task_id: task.id })
    }

    async fn mark_started(&self, task: &ClaimedTask) {
        let progress = ProgressReport {
            device_id: self.device_id.clone(),
            claim_token: task.claim_token,
            progress: 1,
        };
        if let Err(e) = self.client.report_progress(task.id, &progress).await {
            tracing::debug!(task_id = task.id, error = %e, "Start progress not recorded");
        }
    }
}
