// Inference client adapter
//
// Single point of contact with the OpenAI-compatible endpoint. Everything
// above this module talks to `InferenceBackend`, so tests can substitute a
// scripted backend for the HTTP client.

use async_trait::async_trait;
use thiserror::Error;

pub mod client;
pub mod retry;
pub mod stream;
pub mod types;

pub use client::InferenceClient;
pub use retry::{AttemptError, RetryPolicy};
pub use stream::{StreamChunk, TextStream};
pub use types::{ChatMessage, Role};

/// Failures surfaced by the inference adapter after its own retries
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("backend not running at {url} (gave up after {attempts} attempts: {reason})")]
    UnreachableBackend {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("model '{model}' not found (available: {})", format_models(.available))]
    ModelNotFound {
        model: String,
        available: Vec<String>,
    },

    #[error("invalid response after {attempts} attempts: {reason}")]
    InvalidResponse { attempts: u32, reason: String },

    #[error("inference API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("refusing to send an empty conversation")]
    EmptyConversation,

    #[error("failed to set up HTTP client: {0}")]
    Setup(String),
}

fn format_models(models: &[String]) -> String {
    if models.is_empty() {
        "none found".to_string()
    } else {
        models.join(", ")
    }
}

/// A completion in one of the two delivery modes
pub enum Completion {
    Text(String),
    Stream(TextStream),
}

impl Completion {
    /// Resolve to the full text, draining the stream if necessary
    pub async fn into_text(self) -> Result<String, ClientError> {
        match self {
            Completion::Text(text) => Ok(text),
            Completion::Stream(stream) => stream.collect_text().await,
        }
    }
}

/// The inference endpoint as seen by agents
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Send the ordered messages and return a single value or a lazy stream.
    ///
    /// Retries, backoff and response validation happen behind this call.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<Completion, ClientError>;

    /// Endpoint URL, for error messages and logs
    fn endpoint(&self) -> &str;

    /// Model name requests are sent for
    fn model(&self) -> &str;
}
