//! Flow: create a page and optionally append content blocks.

use anyhow::{Context, Result};
use axum::Json;
use axum::extract::State;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{FlowContext, parse_request, store_unavailable};
use crate::notion::{HttpNotionClient, NotionApi};
use crate::server::AppState;

const FLOW_NAME: &str = "createPageWithBlocks";

#[derive(Deserialize)]
pub(crate) struct CreatePageWithBlocksRequest {
    pub notion_token: String,
    pub parent: Value,
    pub title: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub blocks: Vec<Value>,
    #[serde(default)]
    pub icon: Option<Value>,
    #[serde(default)]
    pub cover: Option<Value>,
}

pub(crate) async fn create_page_with_blocks(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let ctx = match FlowContext::begin(&state, FLOW_NAME, None).await {
        Ok(ctx) => ctx,
        Err(e) => return store_unavailable(e),
    };

    let result = async {
        let request: CreatePageWithBlocksRequest = parse_request(body)?;
        let notion = HttpNotionClient::new(
            state.http_client.clone(),
            &state.config.notion_base_url,
            request.notion_token.clone(),
        );
        run(&ctx, &notion, request).await
    }
    .await;

    ctx.finish(result).await
}

pub(crate) async fn run(
    ctx: &FlowContext,
    notion: &dyn NotionApi,
    request: CreatePageWithBlocksRequest,
) -> Result<Value> {
    // Caller-supplied properties are merged in first; the title property is
    // owned by this flow and always wins on key collision.
    let mut properties = request.properties;
    properties.insert(
        "title".to_string(),
        json!({ "title": [{ "text": { "content": request.title } }] }),
    );

    let mut body = json!({
        "parent": request.parent,
        "properties": properties,
    });
    if let Some(icon) = request.icon {
        body["icon"] = icon;
    }
    if let Some(cover) = request.cover {
        body["cover"] = cover;
    }

    let page = notion.create_page(body).await?;
    let page_id = page["id"]
        .as_str()
        .context("Notion response missing page id")?
        .to_string();
    ctx.post(
        "page_created",
        json!({ "pageId": page_id, "title": request.title }),
    );

    // Appending is skipped entirely when no blocks were supplied; omission
    // is not an error.
    let mut appended = Value::Null;
    if !request.blocks.is_empty() {
        let block_count = request.blocks.len();
        appended = notion.append_block_children(&page_id, request.blocks).await?;
        ctx.post(
            "blocks_appended",
            json!({ "pageId": page_id, "blockCount": block_count }),
        );
    }

    Ok(json!({ "page": page, "blocks": appended }))
}
