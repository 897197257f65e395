use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, middleware};
use hyper::StatusCode;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use super::AppState;
use super::middleware as relay_middleware;
use super::monitor;
use super::openapi;
use super::raw;
use crate::flows;
use crate::flows::stream;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(vec![
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-notion-token"),
        ]);

    // Bearer-protected surface: raw passthrough, flows, monitoring.
    let protected = Router::new()
        .nest(
            "/api",
            Router::new().merge(raw::router()).merge(flows::router()),
        )
        .merge(monitor::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            relay_middleware::require_api_key,
        ));

    // The SSE bridge does its own auth (query-param fallback for
    // EventSource); the WebSocket endpoint is open by design.
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/openapi", get(openapi::openapi_spec))
        .route("/openapi.json", get(openapi::openapi_spec))
        .route("/mcp/stream/{flow_id}", get(stream::stream_flow_events))
        .route("/ws/flow-updates/{flow_id}", get(stream::flow_updates_ws))
        .merge(protected)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            relay_middleware::log_request,
        ))
        .with_state(state)
        .layer(middleware::from_fn(relay_middleware::strip_trailing_slash))
        .layer(cors)
}

async fn service_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "notion-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "flows": "/api/flows/*",
            "raw": "/api/raw/*",
            "stream": "/mcp/stream/{flowRunId}",
            "websocket": "/ws/flow-updates/{flowRunId}",
            "monitor": "/monitor",
            "openapi": "/openapi",
        },
        "authenticated": state.config.api_key.is_some(),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found(req: axum::extract::Request) -> impl IntoResponse {
    tracing::warn!("unhandled path: {}", req.uri());
    (
        StatusCode::NOT_FOUND,
        Json(super::envelope::error("Not Found")),
    )
}
