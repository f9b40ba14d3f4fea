use serde::{Deserialize, Serialize};

/// Inbound client frame: one chat request per exchange.
#[derive(Debug, Deserialize)]
pub struct WsChatRequest {
    #[serde(default)]
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Token,
    Done,
    Error,
}

/// Outbound server frame. An exchange is zero or more `token` frames
/// followed by exactly one `done` or `error` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsChatFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub content: String,
}

impl WsChatFrame {
    pub fn token(content: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Token,
            content: content.into(),
        }
    }

    pub fn done() -> Self {
        Self {
            kind: FrameKind::Done,
            content: String::new(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: FrameKind::Error,
            content: content.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "type": self.kind, "content": self.content }).to_string()
    }
}
