use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::config::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub sessions: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct SessionStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub max_age_seconds: u64,
    pub cleanup_in_seconds: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.sessions.list().await;
    let now = Utc::now();
    let idle_cutoff = chrono::Duration::from_std(state.config.session_timeout)
        .unwrap_or_else(|_| chrono::Duration::hours(1));
    let active = sessions
        .iter()
        .filter(|s| now - s.updated_at < idle_cutoff)
        .count();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now,
        sessions: SessionStats {
            total: sessions.len(),
            active,
            inactive: sessions.len() - active,
            max_age_seconds: state.config.session_timeout.as_secs(),
            cleanup_in_seconds: state.config.sweep_interval.as_secs(),
        },
    })
}
