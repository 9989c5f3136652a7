//! HTTP client for the center's device-facing endpoints.

use fleet_core::task::{ProgressReport, TaskReport};
use fleet_core::types::DbId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A task handed to this device by `claim_next`. Only the fields the
/// agent needs are decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedTask {
    pub id: DbId,
    pub kind: String,
    pub account_id: DbId,
    pub payload: serde_json::Value,
    /// Echoed back in every report for this claim.
    pub claim_token: Uuid,
    #[serde(default)]
    pub retry_count: i32,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct RegisterBody<'a> {
    device_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_address: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct HeartbeatBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    device_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_address: Option<&'a str>,
}

/// Errors talking to the center. All of them are transient from the
/// agent's point of view: the next cycle simply tries again.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The center returned a non-2xx status code.
    #[error("Center API error ({status}): {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct CenterClient {
    client: reqwest::Client,
    base_url: String,
}

impl CenterClient {
    /// * `base_url` - e.g. `http://center:3000`, without a trailing slash.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    /// `POST /devices/register`
    pub async fn register(
        &self,
        device_id: &str,
        device_name: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url("/devices/register"))
            .json(&RegisterBody {
                device_id,
                device_name,
                ip_address,
            })
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// `POST /devices/{device_id}/heartbeat`
    pub async fn heartbeat(
        &self,
        device_id: &str,
        device_name: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/devices/{device_id}/heartbeat")))
            .json(&HeartbeatBody {
                device_name,
                ip_address,
            })
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// `GET /devices/{device_id}/tasks/next`
    pub async fn claim_next(&self, device_id: &str) -> Result<Option<ClaimedTask>, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/devices/{device_id}/tasks/next")))
            .send()
            .await?;
        Self::parse_data(response).await
    }

    /// `POST /tasks/{id}/report`. Returns `false` when the center ignored
    /// the report because the task was no longer running for this device.
    pub async fn report(&self, task_id: DbId, report: &TaskReport) -> Result<bool, ClientError> {
        #[derive(Deserialize)]
        struct Outcome {
            outcome: String,
        }

        let response = self
            .client
            .post(self.url(&format!("/tasks/{task_id}/report")))
            .json(report)
            .send()
            .await?;
        let outcome: Outcome = Self::parse_data(response).await?;
        Ok(outcome.outcome == "accepted")
    }

    /// `POST /tasks/{id}/progress`
    pub async fn report_progress(
        &self,
        task_id: DbId,
        report: &ProgressReport,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/tasks/{task_id}/progress")))
            .json(report)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn parse_data<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let envelope: DataEnvelope<T> = response.json().await?;
        Ok(envelope.data)
    }
}
