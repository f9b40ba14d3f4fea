pub mod decoder;
mod types;

pub use types::{
    CompletionChoice, CompletionRequest, CompletionResponse, StreamChoice, StreamDelta,
    StreamResponse, TokenEvent,
};

use futures::{Stream, StreamExt};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::server::models::chat::Message;
use decoder::decode_sse;

pub const DEFAULT_MODEL: &str = "deepseek-chat";

// Bounds the blocking completion; streaming calls are bounded per exchange
// by their caller
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not configured")]
    MissingApiKey,
    #[error("API request failed with status {0}")]
    Status(reqwest::StatusCode),
    #[error("no response from model")]
    EmptyChoices,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Client for the upstream OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct LlmService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmService {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Blocking completion over the full transcript. Unlike the streaming
    /// path, a body that fails to parse is a hard error here: there is only
    /// one body and nothing to salvage from a bad one.
    pub async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            stream: false,
        };
        debug!(model = %request.model, turns = request.messages.len(), "completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LlmError::Status(response.status()));
        }

        let completion: CompletionResponse = response.json().await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyChoices)?;
        Ok(choice.message.content)
    }

    /// Streaming completion as a lazy [`TokenEvent`] stream. Request setup
    /// failures become a single `Error` event so callers see one uniform
    /// event sequence; dropping the stream aborts the upstream request.
    pub fn chat_stream(&self, messages: Vec<Message>) -> impl Stream<Item = TokenEvent> + Send {
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            stream: true,
        };

        async_stream::stream! {
            if api_key.is_empty() {
                yield TokenEvent::Error("API key not configured".to_string());
                return;
            }

            let response = match client
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&request)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    yield TokenEvent::Error(format!("failed to send request: {e}"));
                    return;
                }
            };

            if !response.status().is_success() {
                yield TokenEvent::Error(format!(
                    "API request failed with status {}",
                    response.status()
                ));
                return;
            }

            let events = decode_sse(response.bytes_stream());
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                yield event;
            }
        }
    }
}
