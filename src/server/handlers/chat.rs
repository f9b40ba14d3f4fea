use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::server::{
    config::AppState,
    models::chat::Message,
    services::session::SessionError,
};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Synchronous chat endpoint: append the user turn, run one blocking
/// completion over the whole transcript, append and return the reply.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    // A stale or empty session id falls back to a fresh session; a lookup
    // miss is never surfaced to the client as a failure.
    let session = match state.sessions.get(&request.session_id).await {
        Ok(session) => session,
        Err(_) => {
            info!(session_id = %request.session_id, "session not found, creating a new one");
            state.sessions.create().await
        }
    };

    state
        .sessions
        .append(&session.id, Message::user(&request.message))
        .await
        .map_err(|e| match e {
            SessionError::InvalidMessage(_) => (StatusCode::BAD_REQUEST, e.to_string()),
            SessionError::NotFound => {
                error!(session = %session.id, "session vanished before user append");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        })?;

    // Re-read so the completion sees the turn just appended
    let transcript = state.sessions.get(&session.id).await.map_err(|e| {
        error!(session = %session.id, "failed to load transcript: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let reply = state.llm.chat(&transcript.messages).await.map_err(|e| {
        error!(session = %session.id, "completion failed: {}", e);
        (
            StatusCode::BAD_GATEWAY,
            format!("failed to generate response: {e}"),
        )
    })?;

    state
        .sessions
        .append(&session.id, Message::assistant(&reply))
        .await
        .map_err(|e| {
            error!(session = %session.id, "failed to record assistant turn: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(ChatResponse {
        session_id: session.id,
        message: reply,
        timestamp: Utc::now(),
    }))
}
