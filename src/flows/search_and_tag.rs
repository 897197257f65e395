//! Flow: search for pages and bulk-apply a property to every match.
//!
//! Per-page update failures are isolated: they are posted as
//! `page_update_failed` events and do not abort the loop. Partial success is
//! success at the flow level.

use anyhow::Result;
use axum::Json;
use axum::extract::State;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{FlowContext, parse_request, store_unavailable};
use crate::notion::{HttpNotionClient, NotionApi};
use crate::server::AppState;

const FLOW_NAME: &str = "searchAndTag";

#[derive(Deserialize)]
pub(crate) struct SearchAndTagRequest {
    pub notion_token: String,
    pub query: String,
    pub property_name: String,
    pub property_value: Value,
    #[serde(default)]
    pub filter: Option<Value>,
}

pub(crate) async fn search_and_tag(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let ctx = match FlowContext::begin(&state, FLOW_NAME, None).await {
        Ok(ctx) => ctx,
        Err(e) => return store_unavailable(e),
    };

    let result = async {
        let request: SearchAndTagRequest = parse_request(body)?;
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
    request: SearchAndTagRequest,
) -> Result<Value> {
    let mut search_body = json!({ "query": request.query });
    if let Some(filter) = &request.filter {
        search_body["filter"] = filter.clone();
    }

    let search_results = notion.search(search_body).await?;
    let results = search_results["results"].as_array().cloned().unwrap_or_default();
    ctx.post(
        "search_completed",
        json!({ "resultCount": results.len() }),
    );

    let mut updated_pages = Vec::new();
    for item in &results {
        if item["object"] != "page" {
            continue;
        }
        let Some(page_id) = item["id"].as_str() else {
            continue;
        };

        let mut properties = serde_json::Map::new();
        properties.insert(
            request.property_name.clone(),
            request.property_value.clone(),
        );
        let update_body = json!({ "properties": properties });
        match notion.update_page(page_id, update_body).await {
            Ok(updated) => updated_pages.push(updated),
            Err(e) => {
                // One bad page must not abort the rest of the batch.
                tracing::warn!(page_id = %page_id, error = %e, "failed to update page");
                ctx.post(
                    "page_update_failed",
                    json!({ "pageId": page_id, "error": e.to_string() }),
                );
            }
        }
    }

    Ok(json!({
        "search_results": search_results,
        "updated_count": updated_pages.len(),
        "updated_pages": updated_pages,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::store::RunStatus;
    use crate::flows::test_support::test_state;
    use crate::flows::testing::{FakeNotion, drain_events, event_types};

    fn request() -> SearchAndTagRequest {
        SearchAndTagRequest {
            notion_token: "secret".to_string(),
            query: "roadmap".to_string(),
            property_name: "Reviewed".to_string(),
            property_value: json!({ "checkbox": true }),
            filter: None,
        }
    }

    fn search_results(page_ids: &[&str]) -> Value {
        let results: Vec<Value> = page_ids
            .iter()
            .map(|id| json!({ "object": "page", "id": id }))
            .collect();
        json!({ "object": "list", "results": results })
    }

    #[tokio::test]
    async fn test_partial_failure_still_completes() {
        let state = test_state();
        let mut rx = state.monitor.channel("1").attach();
        let ctx = FlowContext::begin(&state, FLOW_NAME, None).await.unwrap();
        let notion = FakeNotion::new();
        *notion.search_results.lock().unwrap() = search_results(&["a", "b", "c"]);
        notion
            .failing_page_updates
            .lock()
            .unwrap()
            .insert("b".to_string());

        let result = run(&ctx, &notion, request()).await;
        let (status, Json(envelope)) = ctx.finish(result).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope["data"]["updated_count"], 2);

        let runs = state.store.recent_runs(1).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Completed);

        let events = drain_events(&mut rx);
        let failed: Vec<&Value> = events
            .iter()
            .filter(|e| e["type"] == "page_update_failed")
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["pageId"], "b");
        assert_eq!(event_types(&events).last().unwrap(), "flow_completed");
    }

    #[tokio::test]
    async fn test_non_page_results_are_skipped() {
        let state = test_state();
        let ctx = FlowContext::begin(&state, FLOW_NAME, None).await.unwrap();
        let notion = FakeNotion::new();
        *notion.search_results.lock().unwrap() = json!({
            "object": "list",
            "results": [
                { "object": "database", "id": "db-1" },
                { "object": "page", "id": "p-1" },
            ],
        });

        let result = run(&ctx, &notion, request()).await.unwrap();

        assert_eq!(result["updated_count"], 1);
        let update_calls = notion.calls_for("update_page");
        assert_eq!(update_calls.len(), 1);
        assert_eq!(update_calls[0]["page_id"], "p-1");
        assert_eq!(
            update_calls[0]["body"]["properties"]["Reviewed"]["checkbox"],
            true
        );
    }

    #[tokio::test]
    async fn test_empty_search_completes_with_zero_updates() {
        let state = test_state();
        let ctx = FlowContext::begin(&state, FLOW_NAME, None).await.unwrap();
        let notion = FakeNotion::new();
        *notion.search_results.lock().unwrap() = search_results(&[]);

        let result = run(&ctx, &notion, request()).await.unwrap();
        assert_eq!(result["updated_count"], 0);
        assert!(notion.calls_for("update_page").is_empty());
    }

    #[tokio::test]
    async fn test_filter_is_passed_through_to_search() {
        let state = test_state();
        let ctx = FlowContext::begin(&state, FLOW_NAME, None).await.unwrap();
        let notion = FakeNotion::new();
        *notion.search_results.lock().unwrap() = search_results(&[]);

        let mut req = request();
        req.filter = Some(json!({ "value": "page", "property": "object" }));
        run(&ctx, &notion, req).await.unwrap();

        let search_calls = notion.calls_for("search");
        assert_eq!(search_calls[0]["query"], "roadmap");
        assert_eq!(search_calls[0]["filter"]["value"], "page");
    }
}
