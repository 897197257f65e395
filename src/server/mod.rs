pub mod envelope;
pub mod middleware;
pub mod monitor;
pub mod openapi;
pub mod raw;
pub mod routes;

use std::sync::Arc;

use axum::Router;

use crate::ai::AiClient;
use crate::config::Config;
use crate::flows::channel::FlowMonitor;
use crate::flows::store::RunStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RunStore>,
    pub monitor: Arc<FlowMonitor>,
    pub http_client: Arc<reqwest::Client>,
    pub ai: Arc<dyn AiClient>,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}
