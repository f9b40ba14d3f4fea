use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
};
use tracing::{error, info};

use crate::server::config::AppState;

pub mod handlers;
pub mod types;

use handlers::chat::ChatHandler;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    info!("websocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let handler = ChatHandler::new(state);
    match handler.run(socket).await {
        Ok(()) => info!("websocket connection closed"),
        Err(e) => error!("websocket error: {}", e),
    }
}
