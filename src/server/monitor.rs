//! Read-only monitoring endpoints over the run store.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use super::envelope;

const MAX_LIMIT: usize = 200;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/monitor", get(monitor_overview))
        .route("/monitor/logs", get(monitor_logs))
        .route("/monitor/flows", get(monitor_flows))
}

#[derive(Deserialize)]
pub(crate) struct MonitorQuery {
    pub limit: Option<usize>,
}

fn clamp_limit(requested: Option<usize>, default: usize) -> usize {
    requested.unwrap_or(default).min(MAX_LIMIT)
}

/// GET /monitor — recent request logs and flow runs side by side.
pub(crate) async fn monitor_overview(
    State(state): State<AppState>,
    Query(query): Query<MonitorQuery>,
) -> (StatusCode, Json<Value>) {
    let limit = clamp_limit(query.limit, 50);

    let logs = match state.store.recent_logs(limit).await {
        Ok(logs) => logs,
        Err(e) => return store_error(e),
    };
    let flow_runs = match state.store.recent_runs(limit).await {
        Ok(runs) => runs,
        Err(e) => return store_error(e),
    };

    (
        StatusCode::OK,
        Json(envelope::success(json!({
            "logs": logs,
            "flowRuns": flow_runs,
        }))),
    )
}

pub(crate) async fn monitor_logs(
    State(state): State<AppState>,
    Query(query): Query<MonitorQuery>,
) -> (StatusCode, Json<Value>) {
    let limit = clamp_limit(query.limit, 100);
    match state.store.recent_logs(limit).await {
        Ok(logs) => (
            StatusCode::OK,
            Json(envelope::success(json!({ "logs": logs }))),
        ),
        Err(e) => store_error(e),
    }
}

pub(crate) async fn monitor_flows(
    State(state): State<AppState>,
    Query(query): Query<MonitorQuery>,
) -> (StatusCode, Json<Value>) {
    let limit = clamp_limit(query.limit, 100);
    match state.store.recent_runs(limit).await {
        Ok(runs) => (
            StatusCode::OK,
            Json(envelope::success(json!({ "flowRuns": runs }))),
        ),
        Err(e) => store_error(e),
    }
}

fn store_error(e: anyhow::Error) -> (StatusCode, Json<Value>) {
    tracing::error!(error = %e, "monitor query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(envelope::error(format!("{e:#}"))),
    )
}
