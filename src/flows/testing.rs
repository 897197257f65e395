//! Shared fakes for flow executor tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::ai::{AiClient, ChatMessage};
use crate::notion::{NotionApi, NotionError};

/// In-memory Notion fake. Records every call; individual operations can be
/// scripted to fail.
#[derive(Default)]
pub(crate) struct FakeNotion {
    pub calls: Mutex<Vec<(String, Value)>>,
    page_counter: AtomicU32,
    /// Response for `search`.
    pub search_results: Mutex<Value>,
    /// Response for `retrieve_database`.
    pub database: Mutex<Value>,
    /// Page ids whose `update_page` fails.
    pub failing_page_updates: Mutex<HashSet<String>>,
    /// When set, `create_page` fails with this message.
    pub create_page_error: Mutex<Option<String>>,
}

impl FakeNotion {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, op: &str, body: Value) {
        self.calls.lock().unwrap().push((op.to_string(), body));
    }

    pub fn calls_for(&self, op: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == op)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn upstream(message: &str) -> NotionError {
        NotionError::Api {
            status: 400,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl NotionApi for FakeNotion {
    async fn retrieve_page(&self, page_id: &str) -> Result<Value, NotionError> {
        self.record("retrieve_page", json!({ "page_id": page_id }));
        Ok(json!({ "object": "page", "id": page_id }))
    }

    async fn create_page(&self, body: Value) -> Result<Value, NotionError> {
        self.record("create_page", body);
        if let Some(message) = self.create_page_error.lock().unwrap().clone() {
            return Err(Self::upstream(&message));
        }
        let n = self.page_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({ "object": "page", "id": format!("page-{n}") }))
    }

    async fn update_page(&self, page_id: &str, body: Value) -> Result<Value, NotionError> {
        self.record("update_page", json!({ "page_id": page_id, "body": body }));
        if self.failing_page_updates.lock().unwrap().contains(page_id) {
            return Err(Self::upstream("page is archived"));
        }
        Ok(json!({ "object": "page", "id": page_id }))
    }

    async fn retrieve_database(&self, database_id: &str) -> Result<Value, NotionError> {
        self.record("retrieve_database", json!({ "database_id": database_id }));
        Ok(self.database.lock().unwrap().clone())
    }

    async fn create_database(&self, body: Value) -> Result<Value, NotionError> {
        self.record("create_database", body);
        Ok(json!({ "object": "database", "id": "db-new" }))
    }

    async fn query_database(&self, database_id: &str, body: Value) -> Result<Value, NotionError> {
        self.record(
            "query_database",
            json!({ "database_id": database_id, "body": body }),
        );
        Ok(json!({ "object": "list", "results": [] }))
    }

    async fn list_block_children(&self, block_id: &str) -> Result<Value, NotionError> {
        self.record("list_block_children", json!({ "block_id": block_id }));
        Ok(json!({ "object": "list", "results": [] }))
    }

    async fn append_block_children(
        &self,
        block_id: &str,
        children: Vec<Value>,
    ) -> Result<Value, NotionError> {
        self.record(
            "append_block_children",
            json!({ "block_id": block_id, "children": children }),
        );
        Ok(json!({ "object": "list", "results": [] }))
    }

    async fn delete_block(&self, block_id: &str) -> Result<Value, NotionError> {
        self.record("delete_block", json!({ "block_id": block_id }));
        Ok(json!({ "object": "block", "id": block_id, "archived": true }))
    }

    async fn list_users(&self) -> Result<Value, NotionError> {
        self.record("list_users", Value::Null);
        Ok(json!({ "object": "list", "results": [] }))
    }

    async fn retrieve_user(&self, user_id: &str) -> Result<Value, NotionError> {
        self.record("retrieve_user", json!({ "user_id": user_id }));
        Ok(json!({ "object": "user", "id": user_id }))
    }

    async fn search(&self, body: Value) -> Result<Value, NotionError> {
        self.record("search", body);
        Ok(self.search_results.lock().unwrap().clone())
    }
}

/// AI fake that replays scripted responses in order.
pub(crate) struct FakeAi {
    responses: Mutex<Vec<String>>,
}

impl FakeAi {
    pub fn scripted(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
        }
    }
}

#[async_trait]
impl AiClient for FakeAi {
    async fn generate(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String> {
        match self.responses.lock().unwrap().pop() {
            Some(response) => Ok(response),
            None => bail!("no scripted AI response left"),
        }
    }
}

/// Drain everything currently buffered on an observer receiver.
pub(crate) fn drain_events(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(payload) = rx.try_recv() {
        events.push(serde_json::from_str(&payload).unwrap());
    }
    events
}

pub(crate) fn event_types(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["type"].as_str().unwrap().to_string())
        .collect()
}
