//! Notion API client.
//!
//! One client instance is built per request, carrying only the credential the
//! caller supplied. The `NotionApi` trait is the seam the flow executors and
//! raw proxy handlers are written against, so tests can substitute fakes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

const NOTION_API_VERSION: &str = "2022-06-28";

#[derive(Debug, thiserror::Error)]
pub enum NotionError {
    #[error("Notion API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Notion request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait NotionApi: Send + Sync {
    async fn retrieve_page(&self, page_id: &str) -> Result<Value, NotionError>;
    async fn create_page(&self, body: Value) -> Result<Value, NotionError>;
    async fn update_page(&self, page_id: &str, body: Value) -> Result<Value, NotionError>;
    async fn retrieve_database(&self, database_id: &str) -> Result<Value, NotionError>;
    async fn create_database(&self, body: Value) -> Result<Value, NotionError>;
    async fn query_database(&self, database_id: &str, body: Value) -> Result<Value, NotionError>;
    async fn list_block_children(&self, block_id: &str) -> Result<Value, NotionError>;
    async fn append_block_children(
        &self,
        block_id: &str,
        children: Vec<Value>,
    ) -> Result<Value, NotionError>;
    async fn delete_block(&self, block_id: &str) -> Result<Value, NotionError>;
    async fn list_users(&self) -> Result<Value, NotionError>;
    async fn retrieve_user(&self, user_id: &str) -> Result<Value, NotionError>;
    async fn search(&self, body: Value) -> Result<Value, NotionError>;
}

pub struct HttpNotionClient {
    http_client: Arc<reqwest::Client>,
    base_url: String,
    token: String,
}

impl HttpNotionClient {
    pub fn new(http_client: Arc<reqwest::Client>, base_url: &str, token: String) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, NotionError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self
            .http_client
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", NOTION_API_VERSION);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status();
        let payload: Value = response.json().await?;

        if !status.is_success() {
            let message = payload["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(NotionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(payload)
    }
}

#[async_trait]
impl NotionApi for HttpNotionClient {
    async fn retrieve_page(&self, page_id: &str) -> Result<Value, NotionError> {
        self.request(reqwest::Method::GET, &format!("/pages/{page_id}"), None)
            .await
    }

    async fn create_page(&self, body: Value) -> Result<Value, NotionError> {
        self.request(reqwest::Method::POST, "/pages", Some(&body))
            .await
    }

    async fn update_page(&self, page_id: &str, body: Value) -> Result<Value, NotionError> {
        self.request(
            reqwest::Method::PATCH,
            &format!("/pages/{page_id}"),
            Some(&body),
        )
        .await
    }

    async fn retrieve_database(&self, database_id: &str) -> Result<Value, NotionError> {
        self.request(
            reqwest::Method::GET,
            &format!("/databases/{database_id}"),
            None,
        )
        .await
    }

    async fn create_database(&self, body: Value) -> Result<Value, NotionError> {
        self.request(reqwest::Method::POST, "/databases", Some(&body))
            .await
    }

    async fn query_database(&self, database_id: &str, body: Value) -> Result<Value, NotionError> {
        self.request(
            reqwest::Method::POST,
            &format!("/databases/{database_id}/query"),
            Some(&body),
        )
        .await
    }

    async fn list_block_children(&self, block_id: &str) -> Result<Value, NotionError> {
        self.request(
            reqwest::Method::GET,
            &format!("/blocks/{block_id}/children"),
            None,
        )
        .await
    }

    async fn append_block_children(
        &self,
        block_id: &str,
        children: Vec<Value>,
    ) -> Result<Value, NotionError> {
        let body = serde_json::json!({ "children": children });
        self.request(
            reqwest::Method::PATCH,
            &format!("/blocks/{block_id}/children"),
            Some(&body),
        )
        .await
    }

    async fn delete_block(&self, block_id: &str) -> Result<Value, NotionError> {
        self.request(reqwest::Method::DELETE, &format!("/blocks/{block_id}"), None)
            .await
    }

    async fn list_users(&self) -> Result<Value, NotionError> {
        self.request(reqwest::Method::GET, "/users", None).await
    }

    async fn retrieve_user(&self, user_id: &str) -> Result<Value, NotionError> {
        self.request(reqwest::Method::GET, &format!("/users/{user_id}"), None)
            .await
    }

    async fn search(&self, body: Value) -> Result<Value, NotionError> {
        self.request(reqwest::Method::POST, "/search", Some(&body))
            .await
    }
}
