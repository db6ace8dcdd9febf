//! Text-classification service behind the [`Classifier`] trait.
//!
//! The scorer only needs `classify(prompt) -> raw text`. [`AnthropicClassifier`]
//! implements it against the Anthropic Messages API with a fixed model and a
//! bounded output length. Retries live in the scorer, not here: one call is
//! one attempt.

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classification request failed: {0}")]
    Transport(String),
    #[error("classification service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("classification service returned no text")]
    EmptyResponse,
    #[error("invalid API credential: {0}")]
    Credential(String),
}

/// Send one prompt to the classification model and return its raw reply.
pub trait Classifier {
    /// Identity of the model answering, recorded with every score.
    fn model(&self) -> &str;

    async fn classify(&self, prompt: &str) -> Result<String, ClassifyError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl MessagesResponse {
    fn text(self) -> Option<String> {
        self.content.into_iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
    }
}

/// Anthropic Messages API client.
pub struct AnthropicClassifier {
    http: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl fmt::Debug for AnthropicClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClassifier")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnthropicClassifier {
    pub fn new(
        api_key: &str,
        model: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, ClassifyError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(api_key)
            .map_err(|e| ClassifyError::Credential(e.to_string()))?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: ANTHROPIC_API_URL.to_string(),
            model: model.to_string(),
            max_tokens,
        })
    }
}

impl Classifier for AnthropicClassifier {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn classify(&self, prompt: &str) -> Result<String, ClassifyError> {
        let t0 = Instant::now();
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![WireMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "Classification API error"
            );
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::Transport(e.to_string()))?;
        debug!(
            stop_reason = ?parsed.stop_reason,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Classification response received"
        );
        parsed.text().ok_or(ClassifyError::EmptyResponse)
    }
}
