use std::path::PathBuf;

/// Runtime configuration, sourced from the environment (after `dotenvy`).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Bearer token protecting `/api/*`, `/monitor` and the SSE stream.
    /// When unset, authentication is disabled (development mode).
    pub api_key: Option<String>,
    /// Path to the SQLite database holding flow runs and request logs.
    pub database_path: PathBuf,
    /// Base URL of the Notion API.
    pub notion_base_url: String,
    /// Base URL of the OpenAI-compatible chat completions endpoint used by
    /// the markdown orchestration flow.
    pub ai_api_url: String,
    pub ai_api_key: Option<String>,
}

fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".notion-relay")
        .join("relay.db")
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8081);

        let api_key = std::env::var("RELAY_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        let database_path = std::env::var("RELAY_DATABASE")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        let notion_base_url = std::env::var("NOTION_BASE_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "https://api.notion.com/v1".to_string());

        let ai_api_url = std::env::var("AI_API_URL")
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let ai_api_key = std::env::var("AI_API_KEY").ok().filter(|k| !k.is_empty());

        Self {
            port,
            api_key,
            database_path,
            notion_base_url,
            ai_api_url,
            ai_api_key,
        }
    }
}
