use serde::{Deserialize, Serialize};

use crate::server::models::chat::Message;

#[derive(Debug, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub message: Message,
}

// Wire shape of one streamed SSE fragment.
#[derive(Debug, Deserialize)]
pub struct StreamResponse {
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamDelta {
    pub content: Option<String>,
}

/// One decoded event of a streamed exchange. The concatenation of every
/// `Delta` payload, in order, is the final assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenEvent {
    Delta(String),
    Done,
    Error(String),
}
