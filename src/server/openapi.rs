//! Machine-readable API description, served at `/openapi`.

use axum::Json;
use serde_json::{Value, json};

pub(crate) async fn openapi_spec() -> Json<Value> {
    Json(document())
}

fn envelope_schema(data: Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            "success": { "type": "boolean" },
            "data": data,
            "error": { "type": "string" },
            "timestamp": { "type": "string", "format": "date-time" },
        },
    })
}

fn flow_operation(summary: &str, properties: Value, required: Value) -> Value {
    json!({
        "post": {
            "summary": summary,
            "security": [{ "bearerAuth": [] }],
            "requestBody": {
                "required": true,
                "content": {
                    "application/json": {
                        "schema": {
                            "type": "object",
                            "properties": properties,
                            "required": required,
                        },
                    },
                },
            },
            "responses": {
                "200": { "description": "Flow completed; data includes flowRunId" },
                "401": { "description": "Unauthorized" },
                "500": { "description": "Flow failed; error message in envelope" },
            },
        },
    })
}

fn document() -> Value {
    let limit_param = json!([{
        "name": "limit",
        "in": "query",
        "schema": { "type": "integer" },
    }]);

    json!({
        "openapi": "3.1.0",
        "info": {
            "title": "Notion Relay API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Proxy and orchestration layer for the Notion API. \
                Raw passthrough endpoints plus multi-step flows with persistent \
                run records and live progress streaming.",
        },
        "servers": [{ "url": "/" }],
        "components": {
            "securitySchemes": {
                "bearerAuth": {
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "API Key",
                },
            },
        },
        "paths": {
            "/health": {
                "get": {
                    "summary": "Health check",
                    "responses": { "200": { "description": "Service status" } },
                },
            },
            "/monitor": {
                "get": {
                    "summary": "Recent request logs and flow runs",
                    "security": [{ "bearerAuth": [] }],
                    "parameters": limit_param,
                    "responses": {
                        "200": {
                            "description": "Monitoring data",
                            "content": {
                                "application/json": {
                                    "schema": envelope_schema(json!({
                                        "type": "object",
                                        "properties": {
                                            "logs": { "type": "array", "items": { "type": "object" } },
                                            "flowRuns": { "type": "array", "items": { "type": "object" } },
                                        },
                                    })),
                                },
                            },
                        },
                        "401": { "description": "Unauthorized" },
                    },
                },
            },
            "/api/flows/createPageWithBlocks": flow_operation(
                "Create a page and append content blocks",
                json!({
                    "notion_token": { "type": "string" },
                    "parent": { "type": "object" },
                    "title": { "type": "string" },
                    "properties": { "type": "object" },
                    "blocks": { "type": "array", "items": { "type": "object" } },
                    "icon": { "type": "object" },
                    "cover": { "type": "object" },
                }),
                json!(["notion_token", "parent", "title"]),
            ),
            "/api/flows/cloneDatabaseSchema": flow_operation(
                "Duplicate a database schema under a new parent",
                json!({
                    "notion_token": { "type": "string" },
                    "source_database_id": { "type": "string" },
                    "parent": { "type": "object" },
                    "title": { "type": "string" },
                }),
                json!(["notion_token", "source_database_id", "parent", "title"]),
            ),
            "/api/flows/searchAndTag": flow_operation(
                "Search pages and bulk-apply a property to every match",
                json!({
                    "notion_token": { "type": "string" },
                    "query": { "type": "string" },
                    "property_name": { "type": "string" },
                    "property_value": {},
                    "filter": { "type": "object" },
                }),
                json!(["notion_token", "query", "property_name", "property_value"]),
            ),
            "/api/flows/orchestrateMarkdownToPages": flow_operation(
                "Convert a markdown document into Notion pages via AI",
                json!({
                    "notion_token": { "type": "string" },
                    "markdown_content": { "type": "string" },
                    "base_parent_page_id": { "type": "string" },
                    "ai_model": { "type": "string" },
                }),
                json!(["notion_token", "markdown_content", "base_parent_page_id", "ai_model"]),
            ),
            "/api/raw/pages": {
                "post": {
                    "summary": "Create a page (raw passthrough)",
                    "security": [{ "bearerAuth": [] }],
                    "responses": { "200": { "description": "Notion response in envelope" } },
                },
            },
            "/api/raw/pages/{page_id}": {
                "get": { "summary": "Retrieve a page", "security": [{ "bearerAuth": [] }],
                         "responses": { "200": { "description": "Notion response in envelope" } } },
                "patch": { "summary": "Update a page", "security": [{ "bearerAuth": [] }],
                           "responses": { "200": { "description": "Notion response in envelope" } } },
            },
            "/api/raw/databases": {
                "post": { "summary": "Create a database", "security": [{ "bearerAuth": [] }],
                          "responses": { "200": { "description": "Notion response in envelope" } } },
            },
            "/api/raw/databases/{database_id}": {
                "get": { "summary": "Retrieve a database", "security": [{ "bearerAuth": [] }],
                         "responses": { "200": { "description": "Notion response in envelope" } } },
            },
            "/api/raw/databases/{database_id}/query": {
                "post": { "summary": "Query a database", "security": [{ "bearerAuth": [] }],
                          "responses": { "200": { "description": "Notion response in envelope" } } },
            },
            "/api/raw/blocks/{block_id}/children": {
                "get": { "summary": "List block children", "security": [{ "bearerAuth": [] }],
                         "responses": { "200": { "description": "Notion response in envelope" } } },
                "patch": { "summary": "Append block children", "security": [{ "bearerAuth": [] }],
                           "responses": { "200": { "description": "Notion response in envelope" } } },
            },
            "/api/raw/blocks/{block_id}": {
                "delete": { "summary": "Archive a block", "security": [{ "bearerAuth": [] }],
                            "responses": { "200": { "description": "Notion response in envelope" } } },
            },
            "/api/raw/users": {
                "get": { "summary": "List users", "security": [{ "bearerAuth": [] }],
                         "responses": { "200": { "description": "Notion response in envelope" } } },
            },
            "/api/raw/users/{user_id}": {
                "get": { "summary": "Retrieve a user", "security": [{ "bearerAuth": [] }],
                         "responses": { "200": { "description": "Notion response in envelope" } } },
            },
            "/api/raw/search": {
                "post": { "summary": "Search pages and databases", "security": [{ "bearerAuth": [] }],
                          "responses": { "200": { "description": "Notion response in envelope" } } },
            },
            "/mcp/stream/{flow_run_id}": {
                "get": {
                    "summary": "SSE stream of flow progress events",
                    "description": "Accepts the API key as a Bearer header or an apiKey query parameter.",
                    "responses": {
                        "200": { "description": "text/event-stream of progress events" },
                        "401": { "description": "Unauthorized" },
                    },
                },
            },
            "/ws/flow-updates/{flow_run_id}": {
                "get": {
                    "summary": "WebSocket stream of flow progress events",
                    "responses": { "101": { "description": "Switching protocols" } },
                },
            },
        },
    })
}
