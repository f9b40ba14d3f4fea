use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const EMBEDDING_MODEL: &str = "deepseek-embed";

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("API key not configured")]
    MissingApiKey,
    #[error("API request failed with status {0}")]
    Status(reqwest::StatusCode),
    #[error("no embeddings returned")]
    Empty,
    #[error("vectors must have the same length")]
    LengthMismatch,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f64>,
}

/// Client for the upstream embeddings endpoint plus the similarity helper
/// used on its output.
#[derive(Debug, Clone)]
pub struct VectorService {
    client: Client,
    api_key: String,
    base_url: String,
}

impl VectorService {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f64>, VectorError> {
        if self.api_key.is_empty() {
            return Err(VectorError::MissingApiKey);
        }
        let request = EmbeddingRequest {
            model: EMBEDDING_MODEL.to_string(),
            input: vec![text.to_string()],
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VectorError::Status(response.status()));
        }

        let embeddings: EmbeddingResponse = response.json().await?;
        embeddings
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(VectorError::Empty)
    }
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64, VectorError> {
    if a.len() != b.len() {
        return Err(VectorError::LengthMismatch);
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}
