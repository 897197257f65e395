mod ai;
mod config;
mod flows;
mod notion;
mod server;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::ai::HttpAiClient;
use crate::flows::channel::FlowMonitor;
use crate::flows::sqlite::SqliteStore;
use crate::flows::store::RunStore;
use crate::server::AppState;

#[derive(Parser)]
#[command(name = "notion-relay", about = "Notion API proxy with orchestrated flows")]
struct Cli {
    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
    /// SQLite database path (overrides RELAY_DATABASE)
    #[arg(long)]
    database: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notion_relay=info,tower_http=warn,hyper=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = config::Config::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database) = cli.database {
        config.database_path = database;
    }

    if config.api_key.is_none() {
        tracing::warn!("RELAY_API_KEY not set - authentication disabled");
    }

    let http_client = Arc::new(
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?,
    );

    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("failed to open database at {}", config.database_path.display()))?;
    tracing::info!(path = %config.database_path.display(), "opened run store");

    let ai = HttpAiClient::new(
        http_client.clone(),
        &config.ai_api_url,
        config.ai_api_key.clone(),
    );

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        store: Arc::new(store) as Arc<dyn RunStore>,
        monitor: Arc::new(FlowMonitor::new()),
        http_client,
        ai: Arc::new(ai),
    };

    let app = server::create_app(state);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!(port, "notion-relay listening");

    axum::serve(listener, app).await?;
    Ok(())
}
