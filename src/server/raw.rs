//! Raw passthrough onto the Notion API.
//!
//! Thin envelope wrappers around the `NotionApi` operations. The caller's
//! integration token travels in the `x-notion-token` header and is used for
//! exactly one upstream call; the proxy holds no Notion credentials of its
//! own.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use hyper::StatusCode;
use serde_json::{Value, json};

use super::AppState;
use super::envelope;
use crate::notion::{HttpNotionClient, NotionApi, NotionError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/raw/pages", post(create_page))
        .route("/raw/pages/{page_id}", get(retrieve_page).patch(update_page))
        .route("/raw/databases", post(create_database))
        .route("/raw/databases/{database_id}", get(retrieve_database))
        .route("/raw/databases/{database_id}/query", post(query_database))
        .route(
            "/raw/blocks/{block_id}/children",
            patch(append_block_children).get(list_block_children),
        )
        .route("/raw/blocks/{block_id}", delete(delete_block))
        .route("/raw/users", get(list_users))
        .route("/raw/users/{user_id}", get(retrieve_user))
        .route("/raw/search", post(search))
}

type RawResponse = (StatusCode, Json<Value>);

/// Build a one-shot client from the request's `x-notion-token` header.
fn client(state: &AppState, headers: &HeaderMap) -> Result<HttpNotionClient, RawResponse> {
    let token = headers
        .get("x-notion-token")
        .and_then(|h| h.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(envelope::error("Missing x-notion-token header")),
            )
        })?;
    Ok(HttpNotionClient::new(
        state.http_client.clone(),
        &state.config.notion_base_url,
        token.to_string(),
    ))
}

fn respond(result: Result<Value, NotionError>) -> RawResponse {
    match result {
        Ok(data) => (StatusCode::OK, Json(envelope::success(data))),
        Err(e) => {
            tracing::warn!(error = %e, "raw Notion call failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(envelope::error(e.to_string())),
            )
        }
    }
}

async fn retrieve_page(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    headers: HeaderMap,
) -> RawResponse {
    match client(&state, &headers) {
        Ok(notion) => respond(notion.retrieve_page(&page_id).await),
        Err(e) => e,
    }
}

async fn create_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> RawResponse {
    match client(&state, &headers) {
        Ok(notion) => respond(notion.create_page(body).await),
        Err(e) => e,
    }
}

async fn update_page(
    State(state): State<AppState>,
    Path(page_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> RawResponse {
    match client(&state, &headers) {
        Ok(notion) => respond(notion.update_page(&page_id, body).await),
        Err(e) => e,
    }
}

async fn retrieve_database(
    State(state): State<AppState>,
    Path(database_id): Path<String>,
    headers: HeaderMap,
) -> RawResponse {
    match client(&state, &headers) {
        Ok(notion) => respond(notion.retrieve_database(&database_id).await),
        Err(e) => e,
    }
}

async fn create_database(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> RawResponse {
    match client(&state, &headers) {
        Ok(notion) => respond(notion.create_database(body).await),
        Err(e) => e,
    }
}

async fn query_database(
    State(state): State<AppState>,
    Path(database_id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> RawResponse {
    let body = body.map(|Json(b)| b).unwrap_or_else(|| json!({}));
    match client(&state, &headers) {
        Ok(notion) => respond(notion.query_database(&database_id, body).await),
        Err(e) => e,
    }
}

async fn list_block_children(
    State(state): State<AppState>,
    Path(block_id): Path<String>,
    headers: HeaderMap,
) -> RawResponse {
    match client(&state, &headers) {
        Ok(notion) => respond(notion.list_block_children(&block_id).await),
        Err(e) => e,
    }
}

async fn append_block_children(
    State(state): State<AppState>,
    Path(block_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> RawResponse {
    let children = match body["children"].as_array() {
        Some(children) => children.clone(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(envelope::error("Request body must contain a children array")),
            );
        }
    };
    match client(&state, &headers) {
        Ok(notion) => respond(notion.append_block_children(&block_id, children).await),
        Err(e) => e,
    }
}

async fn delete_block(
    State(state): State<AppState>,
    Path(block_id): Path<String>,
    headers: HeaderMap,
) -> RawResponse {
    match client(&state, &headers) {
        Ok(notion) => respond(notion.delete_block(&block_id).await),
        Err(e) => e,
    }
}

async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> RawResponse {
    match client(&state, &headers) {
        Ok(notion) => respond(notion.list_users().await),
        Err(e) => e,
    }
}

async fn retrieve_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> RawResponse {
    match client(&state, &headers) {
        Ok(notion) => respond(notion.retrieve_user(&user_id).await),
        Err(e) => e,
    }
}

async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> RawResponse {
    let body = body.map(|Json(b)| b).unwrap_or_else(|| json!({}));
    match client(&state, &headers) {
        Ok(notion) => respond(notion.search(body).await),
        Err(e) => e,
    }
}
