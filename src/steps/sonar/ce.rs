//! Compute-engine task polling and the clock seam behind timed waits.

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Timed-wait seam. The only suspension points in the whole run (submission
/// pacing and poll sleeps) go through this trait.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Server-side background task status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CeTaskStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Canceled,
    /// Unrecognized status string; treated as still running.
    Other(String),
}

impl CeTaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Other(raw) => raw.as_str(),
        }
    }

    fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "IN_PROGRESS" => Self::InProgress,
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            "CANCELED" => Self::Canceled,
            _ => Self::Other(raw.to_string()),
        }
    }
}

/// One snapshot of a CE task as reported by the server.
#[derive(Debug, Clone)]
pub struct CeTaskSnapshot {
    pub status: CeTaskStatus,
    pub analysis_id: Option<String>,
    pub component_key: Option<String>,
    pub error_message: Option<String>,
}

pub trait CeTaskClient {
    fn poll_task(&self, host_url: &str, token: &str, task_id: &str) -> Result<CeTaskSnapshot>;
}

pub struct HttpCeTaskClient {
    agent: ureq::Agent,
}

impl HttpCeTaskClient {
    pub fn new(request_timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(request_timeout))
            .build()
            .into();
        Self { agent }
    }
}

#[derive(Debug, Deserialize)]
struct CeTaskResponse {
    task: Option<CeTaskPayload>,
}

#[derive(Debug, Deserialize)]
struct CeTaskPayload {
    status: String,
    #[serde(rename = "analysisId")]
    analysis_id: Option<String>,
    #[serde(rename = "componentKey")]
    component_key: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

impl CeTaskClient for HttpCeTaskClient {
    fn poll_task(&self, host_url: &str, token: &str, task_id: &str) -> Result<CeTaskSnapshot> {
        let url = format!(
            "{}/api/ce/task?id={}",
            host_url.trim_end_matches('/'),
            urlencoding::encode(task_id)
        );
        // Token-as-username basic auth, the scanner server convention.
        let credentials = base64::engine::general_purpose::STANDARD.encode(format!("{token}:"));
        let authorization = format!("Basic {credentials}");

        let mut response = self
            .agent
            .get(url.as_str())
            .header("Authorization", authorization.as_str())
            .header("Accept", "application/json")
            .call()
            .map_err(|err| anyhow!("query CE task {task_id}: {err}"))?;
        let payload: CeTaskResponse = response
            .body_mut()
            .read_json()
            .context("parse CE task response")?;

        let task = payload
            .task
            .ok_or_else(|| anyhow!("CE task response missing task object"))?;
        Ok(CeTaskSnapshot {
            status: CeTaskStatus::parse(&task.status),
            analysis_id: task.analysis_id,
            component_key: task.component_key,
            error_message: task.error_message,
        })
    }
}
