//! Orchestrated multi-step flows over the Notion API.
//!
//! Every flow follows the same lifecycle: a run row is created before
//! anything else (so even malformed requests leave an audit trail), the flow
//! body executes sequentially posting progress events as it goes, and the run
//! ends in exactly one terminal transition. Nothing escapes the flow
//! boundary; failures become the run's `error_message` and a 500 envelope.

pub mod channel;
pub mod clone_database;
pub mod create_page;
pub mod events;
pub mod markdown_pages;
pub mod search_and_tag;
pub mod sqlite;
pub mod store;
pub mod stream;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use axum::routing::post;
use axum::{Json, Router};
use hyper::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::server::AppState;
use crate::server::envelope;
use self::channel::FlowMonitor;
use self::events::ProgressEvent;
use self::store::RunStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/flows/createPageWithBlocks",
            post(create_page::create_page_with_blocks),
        )
        .route(
            "/flows/cloneDatabaseSchema",
            post(clone_database::clone_database_schema),
        )
        .route("/flows/searchAndTag", post(search_and_tag::search_and_tag))
        .route(
            "/flows/orchestrateMarkdownToPages",
            post(markdown_pages::orchestrate_markdown_to_pages),
        )
}

/// Handle for one flow run: owns the run id and the store/monitor references
/// the executor needs to report progress and reach a terminal state.
pub(crate) struct FlowContext {
    store: Arc<dyn RunStore>,
    monitor: Arc<FlowMonitor>,
    pub run_id: i64,
    flow_name: &'static str,
}

impl FlowContext {
    /// Create the run row (status=running) and announce the start. The row
    /// exists before any remote side effect, so a crash mid-flow still
    /// leaves a detectable `running` record.
    pub async fn begin(
        state: &AppState,
        flow_name: &'static str,
        input_data: Option<String>,
    ) -> Result<Self> {
        let run_id = state.store.create_run(flow_name, input_data).await?;
        let ctx = Self {
            store: state.store.clone(),
            monitor: state.monitor.clone(),
            run_id,
            flow_name,
        };
        ctx.post("flow_started", json!({ "flow": flow_name }));
        Ok(ctx)
    }

    /// Post a progress event to this run's channel. Non-blocking: delivery to
    /// observers never gates the next flow step or the HTTP response.
    pub fn post(&self, event_type: &str, data: Value) {
        self.monitor
            .publish(ProgressEvent::new(self.run_id, event_type, data));
    }

    /// Terminal transition plus the final event and response envelope. The
    /// single catch-all boundary for the flow: every outcome lands here
    /// exactly once.
    pub async fn finish(self, result: Result<Value>) -> (StatusCode, Json<Value>) {
        match result {
            Ok(data) => {
                if let Err(e) = self.store.complete_run(self.run_id, &data.to_string()).await {
                    tracing::error!(run_id = self.run_id, error = %e, "failed to record flow completion");
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(envelope::error(format!("{e:#}"))),
                    );
                }
                self.post("flow_completed", json!({ "flow": self.flow_name }));

                let mut body = match data {
                    Value::Object(map) => map,
                    other => {
                        let mut map = serde_json::Map::new();
                        map.insert("result".to_string(), other);
                        map
                    }
                };
                body.insert("flowRunId".to_string(), json!(self.run_id));
                (StatusCode::OK, Json(envelope::success(Value::Object(body))))
            }
            Err(e) => {
                let message = format!("{e:#}");
                if let Err(store_err) = self.store.fail_run(self.run_id, &message).await {
                    tracing::error!(run_id = self.run_id, error = %store_err, "failed to record flow failure");
                }
                self.post(
                    "flow_failed",
                    json!({ "flow": self.flow_name, "error": message }),
                );
                tracing::warn!(run_id = self.run_id, flow = self.flow_name, error = %message, "flow failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(envelope::error(message)),
                )
            }
        }
    }
}

/// Deserialize a flow request body. Runs after the run row exists, so a
/// malformed payload is recorded as that run's failure reason.
pub(crate) fn parse_request<T: DeserializeOwned>(body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| anyhow!("invalid request: {e}"))
}

/// Shorthand used by flow handlers when the run row itself cannot be created
/// (storage unavailability is propagated, not retried).
pub(crate) fn store_unavailable(e: anyhow::Error) -> (StatusCode, Json<Value>) {
    tracing::error!(error = %e, "failed to create flow run");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(envelope::error(format!("{e:#}"))),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::channel::FlowMonitor;
    use super::sqlite::SqliteStore;
    use super::store::RunStore;
    use crate::config::Config;
    use crate::server::AppState;

    pub fn test_state() -> AppState {
        let config = Config {
            port: 0,
            api_key: None,
            database_path: std::path::PathBuf::from(":memory:"),
            notion_base_url: "http://localhost:1".to_string(),
            ai_api_url: "http://localhost:1".to_string(),
            ai_api_key: None,
        };
        AppState {
            config: Arc::new(config),
            store: Arc::new(SqliteStore::open_in_memory().unwrap()) as Arc<dyn RunStore>,
            monitor: Arc::new(FlowMonitor::new()),
            http_client: Arc::new(reqwest::Client::new()),
            ai: Arc::new(super::testing::FakeAi::scripted(&[])),
        }
    }
}
