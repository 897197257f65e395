//! Flow: AI-assisted conversion of a markdown document into Notion pages.
//!
//! Two-stage AI usage: the planner partitions the markdown into logical
//! pages, then each page's content is converted into Notion block objects.
//! Unlike searchAndTag, any per-page failure aborts the remaining pages —
//! page creation order matters, tagging order does not.

use anyhow::{Context, Result, anyhow, bail};
use axum::Json;
use axum::extract::State;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{FlowContext, parse_request, store_unavailable};
use crate::ai::{AiClient, ChatMessage};
use crate::notion::{HttpNotionClient, NotionApi};
use crate::server::AppState;

const FLOW_NAME: &str = "orchestrateMarkdownToPages";

const PLANNER_PROMPT: &str = "You are a content planner. Analyze the following markdown. \
    Identify all logical pages (e.g., separated by <h1> or ---). For each page, extract its \
    title and its full markdown content. Output a JSON array of {\"title\": string, \
    \"content\": string}.";

const CONVERTER_PROMPT: &str = "You are a markdown-to-Notion converter. Convert the following \
    markdown text into a valid JSON array of Notion API block objects. Use standard block \
    types (heading_1, heading_2, paragraph, bulleted_list_item, etc.). Respond ONLY with the \
    JSON array.";

#[derive(Deserialize)]
pub(crate) struct OrchestrateMarkdownRequest {
    pub notion_token: String,
    pub markdown_content: String,
    pub base_parent_page_id: String,
    pub ai_model: String,
}

#[derive(Debug, Deserialize)]
struct PagePlan {
    title: String,
    content: String,
}

pub(crate) async fn orchestrate_markdown_to_pages(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    // This flow snapshots its raw input at creation, valid or not.
    let input_snapshot = body.to_string();
    let ctx = match FlowContext::begin(&state, FLOW_NAME, Some(input_snapshot)).await {
        Ok(ctx) => ctx,
        Err(e) => return store_unavailable(e),
    };

    let result = async {
        let request: OrchestrateMarkdownRequest = parse_request(body)?;
        let notion = HttpNotionClient::new(
            state.http_client.clone(),
            &state.config.notion_base_url,
            request.notion_token.clone(),
        );
        run(&ctx, &notion, state.ai.as_ref(), request).await
    }
    .await;

    ctx.finish(result).await
}

pub(crate) async fn run(
    ctx: &FlowContext,
    notion: &dyn NotionApi,
    ai: &dyn AiClient,
    request: OrchestrateMarkdownRequest,
) -> Result<Value> {
    let planner_messages = [
        ChatMessage::system(PLANNER_PROMPT),
        ChatMessage::user(&request.markdown_content),
    ];
    let planner_text = ai.generate(&request.ai_model, &planner_messages).await?;
    let plan: Vec<PagePlan> = parse_json_response(&planner_text)
        .map_err(|e| anyhow!("failed to parse AI planning response: {e}"))?;

    ctx.post(
        "planning_completed",
        json!({ "pageCount": plan.len() }),
    );

    let mut pages_created = Vec::new();
    for page_plan in &plan {
        ctx.post(
            "page_creation_started",
            json!({ "title": page_plan.title }),
        );

        let page = notion
            .create_page(json!({
                "parent": { "page_id": request.base_parent_page_id },
                "properties": {
                    "title": { "title": [{ "text": { "content": page_plan.title } }] },
                },
            }))
            .await?;
        let page_id = page["id"]
            .as_str()
            .context("Notion response missing page id")?
            .to_string();
        pages_created.push(json!({ "pageId": page_id, "title": page_plan.title }));
        ctx.post(
            "page_created",
            json!({ "pageId": page_id, "title": page_plan.title }),
        );

        ctx.post("block_conversion_started", json!({ "pageId": page_id }));
        let converter_messages = [
            ChatMessage::system(CONVERTER_PROMPT),
            ChatMessage::user(&page_plan.content),
        ];
        let blocks_text = ai.generate(&request.ai_model, &converter_messages).await?;
        let blocks: Vec<Value> = parse_json_response(&blocks_text)
            .map_err(|e| anyhow!("failed to parse AI block response: {e}"))?;
        for block in &blocks {
            if !block.is_object() {
                bail!("failed to parse AI block response: expected an array of block objects");
            }
        }

        let block_count = blocks.len();
        if !blocks.is_empty() {
            notion.append_block_children(&page_id, blocks).await?;
        }
        ctx.post(
            "blocks_appended",
            json!({ "pageId": page_id, "blockCount": block_count }),
        );
    }

    Ok(json!({ "createdPages": pages_created }))
}

/// Strip any surrounding code-fence markup, then parse. Models frequently
/// wrap JSON answers in ``` fences despite instructions.
fn parse_json_response<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    let normalized = strip_code_fences(text);
    serde_json::from_str(normalized).map_err(|e| anyhow!("{e}"))
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag (```json, ```js, ...) up to the first newline.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
