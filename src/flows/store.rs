use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle status of a flow run. Exactly one forward transition is allowed:
/// running -> completed or running -> failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Persistent record of one flow invocation. Created before any remote
/// side-effecting call, so a crash mid-flow still leaves a `running` row.
#[derive(Debug, Clone, Serialize)]
pub struct FlowRun {
    pub id: i64,
    pub flow_name: String,
    pub status: RunStatus,
    pub input_data: Option<String>,
    pub output_data: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestLog {
    pub id: i64,
    pub path: String,
    pub method: String,
    pub status: u16,
    pub user_agent: Option<String>,
    pub duration_ms: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new run with status=running. Returns the run id.
    async fn create_run(&self, flow_name: &str, input_data: Option<String>) -> Result<i64>;

    /// Transition a run to completed. Errors if the run is not in the
    /// running state (terminal statuses are immutable).
    async fn complete_run(&self, id: i64, output_data: &str) -> Result<()>;

    /// Transition a run to failed. Same terminal-state guard as `complete_run`.
    async fn fail_run(&self, id: i64, error_message: &str) -> Result<()>;

    /// Recent runs, newest `started_at` first.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<FlowRun>>;

    /// Append a request log row. Write-only from the logging middleware.
    async fn log_request(
        &self,
        path: &str,
        method: &str,
        status: u16,
        user_agent: Option<&str>,
        duration_ms: i64,
    ) -> Result<()>;

    /// Recent request logs, newest first.
    async fn recent_logs(&self, limit: usize) -> Result<Vec<RequestLog>>;
}
