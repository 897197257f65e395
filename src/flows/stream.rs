//! Live observation endpoints for flow runs.
//!
//! Two transports over the same per-run channel: a one-way SSE bridge and a
//! duplex WebSocket. Both attach before returning, so they see every event
//! posted after the connection is established and nothing before it.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::flows::events::ProgressEvent;
use crate::server::AppState;
use crate::server::envelope;
use crate::server::middleware::bearer_token;

#[derive(Deserialize)]
pub(crate) struct StreamQuery {
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
}

/// GET /mcp/stream/{flow_id} — SSE bridge onto a run's channel.
///
/// EventSource cannot set request headers, so the key is also accepted as an
/// `apiKey` query parameter.
pub(crate) async fn stream_flow_events(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    if let Some(expected) = state.config.api_key.as_deref() {
        let header_key = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .map(bearer_token);
        let authorized = header_key == Some(expected)
            || query.api_key.as_deref() == Some(expected);
        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                axum::Json(envelope::error("Unauthorized - Invalid API key")),
            )
                .into_response();
        }
    }

    let mut rx = state.monitor.channel(&flow_id).attach();
    tracing::info!(flow_id = %flow_id, "SSE observer attached");

    let stream = async_stream::stream! {
        let hello = json!({ "flowId": flow_id }).to_string();
        yield Ok::<_, Infallible>(Event::default().event("connected").data(hello));

        while let Some(payload) = rx.recv().await {
            yield Ok(Event::default().event("message").data(payload));
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

/// GET /ws/flow-updates/{flow_id} — duplex WebSocket onto a run's channel.
pub(crate) async fn flow_updates_ws(
    State(state): State<AppState>,
    Path(flow_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_flow_socket(socket, state, flow_id))
}

/// Outbound: channel events become text frames. Inbound: text frames that
/// parse as JSON objects are re-posted to the same channel, so every attached
/// observer (SSE included) sees them interleaved with flow milestones.
async fn handle_flow_socket(socket: WebSocket, state: AppState, flow_id: String) {
    let channel = state.monitor.channel(&flow_id);
    let mut rx = channel.attach();
    let run_id = flow_id.parse::<i64>().ok();

    let (mut ws_sink, mut ws_stream) = socket.split();

    let forward_handle = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => {
                let Some(run_id) = run_id else {
                    continue;
                };
                match inbound_event(run_id, &text) {
                    Some(event) => channel.post(event),
                    None => {
                        tracing::debug!(flow_id = %flow_id, "ignoring non-JSON WebSocket frame");
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // Receiver side of the forward task is dropped with the task; the
    // channel prunes the dead sender on its next post.
    forward_handle.abort();
    tracing::debug!(flow_id = %flow_id, "flow WebSocket disconnected");
}

/// Turn an inbound text frame into a rebroadcastable event. `flowRunId` and
/// `timestamp` are channel-assigned fields, so client-supplied values are
/// discarded (the flattened payload must not shadow them on serialization).
fn inbound_event(run_id: i64, text: &str) -> Option<ProgressEvent> {
    let Ok(Value::Object(mut body)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    let event_type = match body.remove("type") {
        Some(Value::String(t)) => t,
        _ => "message".to_string(),
    };
    body.remove("flowRunId");
    body.remove("timestamp");
    Some(ProgressEvent::new(run_id, &event_type, Value::Object(body)))
}
