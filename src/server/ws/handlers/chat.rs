use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{pin_mut, StreamExt};
use tracing::{error, info, warn};

use crate::server::{
    config::AppState,
    models::chat::Message,
    services::llm::TokenEvent,
    ws::types::{WsChatFrame, WsChatRequest},
};

// Upper bound on one exchange, covering the upstream call and forwarding
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-connection streaming orchestrator. The loop is strictly sequential:
/// one exchange runs to its terminal frame before the next request is read.
pub struct ChatHandler {
    state: AppState,
}

impl ChatHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(&self, mut socket: WebSocket) -> Result<(), axum::Error> {
        while let Some(msg) = socket.recv().await {
            let text = match msg? {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => break,
                _ => continue,
            };

            let request: WsChatRequest = match serde_json::from_str(&text) {
                Ok(request) => request,
                Err(_) => {
                    send(&mut socket, WsChatFrame::error("invalid request")).await?;
                    continue;
                }
            };

            self.handle_exchange(&mut socket, request).await?;
        }
        Ok(())
    }

    /// One exchange: append the user turn, stream the upstream completion,
    /// forward tokens in order, and record the assembled assistant turn.
    /// Send failures propagate out, which drops the event stream and with it
    /// the in-flight upstream request.
    async fn handle_exchange(
        &self,
        socket: &mut WebSocket,
        request: WsChatRequest,
    ) -> Result<(), axum::Error> {
        let sessions = &self.state.sessions;

        // Lookup miss falls back to a fresh session, never a failed request
        let session = match sessions.get(&request.session_id).await {
            Ok(session) => session,
            Err(_) => sessions.create().await,
        };

        if let Err(e) = sessions
            .append(&session.id, Message::user(request.message))
            .await
        {
            warn!(session = %session.id, "rejected message: {}", e);
            return send(socket, WsChatFrame::error(e.to_string())).await;
        }

        let transcript = match sessions.get(&session.id).await {
            Ok(session) => session.messages,
            Err(e) => {
                error!(session = %session.id, "session vanished mid-exchange: {}", e);
                return send(socket, WsChatFrame::error(e.to_string())).await;
            }
        };

        let events = self.state.llm.chat_stream(transcript);
        pin_mut!(events);

        let forward = async {
            let mut assistant = String::new();
            while let Some(event) = events.next().await {
                match event {
                    TokenEvent::Delta(content) => {
                        assistant.push_str(&content);
                        send(socket, WsChatFrame::token(content)).await?;
                    }
                    TokenEvent::Done => {
                        // An all-or-nothing append: nothing was written during
                        // forwarding, so an aborted exchange leaves no trace
                        if !assistant.is_empty() {
                            if let Err(e) = sessions
                                .append(&session.id, Message::assistant(&assistant))
                                .await
                            {
                                error!(session = %session.id, "failed to record assistant turn: {}", e);
                            }
                        }
                        info!(session = %session.id, chars = assistant.len(), "exchange complete");
                        return send(socket, WsChatFrame::done()).await;
                    }
                    TokenEvent::Error(reason) => {
                        error!(session = %session.id, "upstream stream failed: {}", reason);
                        return send(socket, WsChatFrame::error(reason)).await;
                    }
                }
            }
            Ok(())
        };

        // A timeout drops the forwarding future, and with it the upstream
        // request; the session keeps only the user turn
        match tokio::time::timeout(EXCHANGE_TIMEOUT, forward).await {
            Ok(result) => result,
            Err(_) => {
                warn!(session = %session.id, "exchange timed out");
                send(socket, WsChatFrame::error("exchange timed out")).await
            }
        }
    }
}

async fn send(socket: &mut WebSocket, frame: WsChatFrame) -> Result<(), axum::Error> {
    socket.send(WsMessage::Text(frame.to_json())).await
}
