//! Automation executor seam.
//!
//! The agent does not know how to publish a video or send a chat message;
//! it hands each claimed task to an [`AutomationExecutor`] and reports
//! whatever comes back. [`CommandExecutor`] runs an external program with
//! the task JSON on stdin and reads a JSON result from stdout:
//!
//! ```text
//! {"success": false, "error": "captcha", "progress": 40, "auth_failed": false}
//! ```

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::task::TaskReport;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::client::ClaimedTask;

/// Result of one automation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, alias = "error_message")]
    pub error: Option<String>,
    #[serde(default)]
    pub progress: Option<i16>,
    /// The platform rejected the account session.
    #[serde(default)]
    pub auth_failed: bool,
}

impl ExecutionResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// The report this device sends back for the claim.
    pub fn into_report(self, device_id: &str, claim_token: Uuid) -> TaskReport {
        TaskReport {
            device_id: device_id.to_string(),
            claim_token,
            success: self.success,
            error_message: if self.success { None } else { self.error },
            progress: self.progress,
            auth_failed: self.auth_failed,
        }
    }
}

#[async_trait]
pub trait AutomationExecutor: Send + Sync {
    /// Perform the task. Failures are values, never errors.
    async fn execute(&self, task: &ClaimedTask) -> ExecutionResult;
}

/// Runs an external automation program per task.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(program: String, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program,
            args,
            timeout,
        }
    }

    async fn run(&self, task: &ClaimedTask) -> Result<std::process::Output, String> {
        let input = serde_json::to_vec(task).map_err(|e| format!("cannot encode task: {e}"))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("FLEET_TASK_ID", task.id.to_string())
            .env("FLEET_TASK_KIND", &task.kind)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to start executor '{}': {e}", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that ignores stdin may close it early; that is fine.
            let _ = stdin.write_all(&input).await;
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("executor I/O error: {e}")),
            Err(_) => Err(format!(
                "executor timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}

/// Parse the last non-empty stdout line as an [`ExecutionResult`].
fn parse_result(stdout: &str) -> Option<ExecutionResult> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|line| serde_json::from_str(line).ok())
}

#[async_trait]
impl AutomationExecutor for CommandExecutor {
    async fn execute(&self, task: &ClaimedTask) -> ExecutionResult {
        tracing::info!(task_id = task.id, kind = %task.kind, program = %self.program, "Running automation");

        let output = match self.run(task).await {
            Ok(output) => output,
            Err(message) => {
                tracing::error!(task_id = task.id, error = %message, "Automation did not complete");
                return ExecutionResult::failed(message);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        match parse_result(&stdout) {
            Some(result) => result,
            None if output.status.success() => ExecutionResult::failed(
                "executor exited without printing a JSON result".to_string(),
            ),
            None => ExecutionResult::failed(format!(
                "executor exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim(),
            )),
        }
    }
}

/// Stand-in used when no executor program is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredExecutor;

#[async_trait]
impl AutomationExecutor for UnconfiguredExecutor {
    async fn execute(&self, task: &ClaimedTask) -> ExecutionResult {
        tracing::warn!(task_id = task.id, "No automation executor configured");
        ExecutionResult::failed("no automation executor configured on this device")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn task() -> ClaimedTask {
        ClaimedTask {
            id: 11,
            kind: "chat".into(),
            account_id: 2,
            payload: serde_json::json!({ "kind": "chat", "target_user": "fan", "message": "hi" }),
            claim_token: Uuid::new_v4(),
            retry_count: 0,
        }
    }

    fn sh(script: &str, timeout: Duration) -> CommandExecutor {
        CommandExecutor::new("sh".into(), vec!["-c".into(), script.into()], timeout)
    }

    #[test]
    fn last_json_line_wins() {
        let out = "log line\n{\"success\": true}\n\n";
        assert_eq!(
            parse_result(out),
            Some(ExecutionResult {
                success: true,
                ..ExecutionResult::default()
            })
        );
        assert_eq!(parse_result("no json here"), None);
    }

    #[test]
    fn report_drops_error_on_success() {
        let report = ExecutionResult {
            success: true,
            error: Some("noise".into()),
            progress: Some(100),
            auth_failed: false,
        }
        .into_report("phone-1", Uuid::nil());
        assert_eq!(report.device_id, "phone-1");
        assert_eq!(report.claim_token, Uuid::nil());
        assert!(report.error_message.is_none());
        assert_eq!(report.progress, Some(100));
    }

    #[tokio::test]
    async fn program_receives_task_and_reports_result() {
        let executor = sh(
            r#"input=$(cat); case "$input" in *'"message":"hi"'*) echo '{"success":true,"progress":100}';; *) echo '{"success":false}';; esac"#,
            Duration::from_secs(10),
        );
        let result = executor.execute(&task()).await;
        assert!(result.success, "{result:?}");
        assert_eq!(result.progress, Some(100));
    }

    #[tokio::test]
    async fn auth_failure_is_passed_through() {
        let executor = sh(
            r#"echo '{"success":false,"error_message":"login required","auth_failed":true}'"#,
            Duration::from_secs(10),
        );
        let result = executor.execute(&task()).await;
        assert!(!result.success);
        assert!(result.auth_failed);
        assert_eq!(result.error.as_deref(), Some("login required"));
    }

    #[tokio::test]
    async fn crash_reports_stderr() {
        let executor = sh("echo boom >&2; exit 3", Duration::from_secs(10));
        let result = executor.execute(&task()).await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("code 3"), "{error}");
        assert!(error.contains("boom"), "{error}");
    }

    #[tokio::test]
    async fn slow_program_times_out() {
        let executor = sh("sleep 5", Duration::from_millis(200));
        let result = executor.execute(&task()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_program_is_a_failure() {
        let executor = CommandExecutor::new(
            "/nonexistent/automation".into(),
            Vec::new(),
            Duration::from_secs(1),
        );
        let result = executor.execute(&task()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("failed to start executor"));
    }
}
