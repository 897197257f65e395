//! Flow: duplicate a database's property schema under a new parent.
//!
//! Schema only — no data rows are copied.

use anyhow::{Context, Result};
use axum::Json;
use axum::extract::State;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{FlowContext, parse_request, store_unavailable};
use crate::notion::{HttpNotionClient, NotionApi};
use crate::server::AppState;

const FLOW_NAME: &str = "cloneDatabaseSchema";

#[derive(Deserialize)]
pub(crate) struct CloneDatabaseSchemaRequest {
    pub notion_token: String,
    pub source_database_id: String,
    pub parent: Value,
    pub title: String,
}

pub(crate) async fn clone_database_schema(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let ctx = match FlowContext::begin(&state, FLOW_NAME, None).await {
        Ok(ctx) => ctx,
        Err(e) => return store_unavailable(e),
    };

    let result = async {
        let request: CloneDatabaseSchemaRequest = parse_request(body)?;
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
    request: CloneDatabaseSchemaRequest,
) -> Result<Value> {
    let source_db = notion.retrieve_database(&request.source_database_id).await?;
    ctx.post(
        "schema_retrieved",
        json!({ "sourceDatabaseId": request.source_database_id }),
    );

    let properties = source_db["properties"]
        .as_object()
        .context("source database has no property schema")?;
    let stripped = strip_property_ids(properties);

    let new_db = notion
        .create_database(json!({
            "parent": request.parent,
            "title": [{ "text": { "content": request.title } }],
            "properties": stripped,
        }))
        .await?;
    ctx.post(
        "database_created",
        json!({ "databaseId": new_db["id"], "title": request.title }),
    );

    Ok(json!({
        "source_database": source_db,
        "new_database": new_db,
    }))
}

/// Property ids are server-assigned and specific to the source database, so
/// they must not appear in the creation request for the clone.
fn strip_property_ids(properties: &serde_json::Map<String, Value>) -> Value {
    let stripped: serde_json::Map<String, Value> = properties
        .iter()
        .map(|(name, prop)| {
            let mut prop = prop.clone();
            if let Some(obj) = prop.as_object_mut() {
                obj.remove("id");
            }
            (name.clone(), prop)
        })
        .collect();
    Value::Object(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::store::RunStatus;
    use crate::flows::test_support::test_state;
    use crate::flows::testing::{FakeNotion, drain_events, event_types};

    fn request() -> CloneDatabaseSchemaRequest {
        CloneDatabaseSchemaRequest {
            notion_token: "secret".to_string(),
            source_database_id: "db-src".to_string(),
            parent: json!({ "page_id": "P" }),
            title: "Cloned".to_string(),
        }
    }

    #[tokio::test]
    async fn test_clone_strips_property_ids() {
        let state = test_state();
        let ctx = FlowContext::begin(&state, FLOW_NAME, None).await.unwrap();
        let notion = FakeNotion::new();
        *notion.database.lock().unwrap() = json!({
            "object": "database",
            "id": "db-src",
            "properties": {
                "Name": { "id": "title", "type": "title", "title": {} },
                "Tags": { "id": "a%3Bf", "type": "multi_select", "multi_select": { "options": [] } },
            },
        });

        run(&ctx, &notion, request()).await.unwrap();

        let create_calls = notion.calls_for("create_database");
        let props = create_calls[0]["properties"].as_object().unwrap();
        for (_, prop) in props {
            assert!(prop.get("id").is_none(), "property id leaked into clone: {prop}");
        }
        assert_eq!(props["Tags"]["type"], "multi_select");
        assert_eq!(
            create_calls[0]["title"][0]["text"]["content"],
            "Cloned"
        );
    }

    #[tokio::test]
    async fn test_clone_copies_no_rows() {
        let state = test_state();
        let ctx = FlowContext::begin(&state, FLOW_NAME, None).await.unwrap();
        let notion = FakeNotion::new();
        *notion.database.lock().unwrap() = json!({
            "object": "database",
            "id": "db-src",
            "properties": { "Name": { "id": "title", "type": "title", "title": {} } },
        });

        run(&ctx, &notion, request()).await.unwrap();

        assert!(notion.calls_for("query_database").is_empty());
        assert!(notion.calls_for("create_page").is_empty());
    }

    #[tokio::test]
    async fn test_source_without_schema_fails_run() {
        let state = test_state();
        let mut rx = state.monitor.channel("1").attach();
        let ctx = FlowContext::begin(&state, FLOW_NAME, None).await.unwrap();
        let notion = FakeNotion::new();
        *notion.database.lock().unwrap() = json!({ "object": "database", "id": "db-src" });

        let result = run(&ctx, &notion, request()).await;
        let (status, _) = ctx.finish(result).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let runs = state.store.recent_runs(1).await.unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);

        let types = event_types(&drain_events(&mut rx));
        assert_eq!(types.last().unwrap(), "flow_failed");
    }
}
