use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::server::{
    handlers::{chat::chat, health::health},
    services::{llm::LlmService, session::SessionStore, vector::VectorService},
    ws::ws_handler,
};

/// Environment-derived settings. Every knob has a default so the service
/// starts with nothing but an API key set.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_url: String,
    pub port: u16,
    pub session_timeout: Duration,
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("DEEPSEEK_API_KEY").unwrap_or_default(),
            api_url: std::env::var("DEEPSEEK_API_URL")
                .unwrap_or_else(|_| "https://api.deepseek.com/v1".to_string()),
            port: env_parsed("PORT", 7071),
            session_timeout: Duration::from_secs(env_parsed("SESSION_TIMEOUT_SECS", 3600)),
            sweep_interval: Duration::from_secs(env_parsed("SESSION_SWEEP_INTERVAL_SECS", 600)),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Shared handles injected into every handler. Built once at startup; the
/// session store is the single source of truth for conversation state.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub sessions: Arc<SessionStore>,
    pub llm: Arc<LlmService>,
    pub vector: Arc<VectorService>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let llm = Arc::new(LlmService::new(
            config.api_key.clone(),
            config.api_url.clone(),
        ));
        let vector = Arc::new(VectorService::new(
            config.api_key.clone(),
            config.api_url.clone(),
        ));
        Self {
            config,
            sessions: Arc::new(SessionStore::new()),
            llm,
            vector,
        }
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    info!("{} {}", request.method(), request.uri().path());
    next.run(request).await
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .route("/ws/chat", get(ws_handler))
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
