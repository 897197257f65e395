//! Text-generation client used by the markdown orchestration flow.
//!
//! The flow only needs "(model, messages) -> text"; the HTTP implementation
//! targets an OpenAI-compatible chat completions endpoint.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait AiClient: Send + Sync {
    async fn generate(&self, model: &str, messages: &[ChatMessage]) -> Result<String>;
}

pub struct HttpAiClient {
    http_client: Arc<reqwest::Client>,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAiClient {
    pub fn new(http_client: Arc<reqwest::Client>, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl AiClient for HttpAiClient {
    async fn generate(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": model,
            "messages": messages,
        });

        let mut req = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req.send().await.context("AI request failed")?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .context("failed to parse AI response")?;

        if !status.is_success() {
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            bail!("AI API returned {status}: {message}");
        }

        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .context("AI response missing message content")?;

        Ok(text.to_string())
    }
}
