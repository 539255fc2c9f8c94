// OpenAI-compatible inference client
//
// Talks to a local endpoint (Ollama by default) over
// POST /v1/chat/completions. Every request runs under the configured
// `RetryPolicy`; streaming requests retry inside a spawned task and signal
// restarts through the channel.

use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tokio::sync::mpsc;

use super::retry::{AttemptError, RetryPolicy};
use super::stream::{StreamChunk, TextStream};
use super::types::{ChatMessage, WireModelList, WireRequest, WireResponse, WireStreamChunk};
use super::{ClientError, Completion, InferenceBackend};
use crate::config::Settings;

const STREAM_BUFFER: usize = 100;
const MODEL_LIST_TIMEOUT_SECS: u64 = 5;

/// HTTP client for a single OpenAI-compatible endpoint
#[derive(Clone)]
pub struct InferenceClient {
    client: Client,
    base_url: String,
    model: String,
    policy: RetryPolicy,
}

impl InferenceClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            policy,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ClientError> {
        Self::new(
            settings.endpoint_url.clone(),
            settings.model_name.clone(),
            Duration::from_secs(settings.timeout_secs),
            settings.retry_policy(),
        )
    }

    /// Models advertised by the endpoint; empty when the listing is unavailable
    pub async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/v1/models", self.base_url);
        match self.fetch_models(&url).await {
            Ok(list) => list.data.into_iter().map(|m| m.id).collect(),
            Err(e) => {
                tracing::debug!("Could not list models at {}: {}", url, e);
                Vec::new()
            }
        }
    }

    async fn fetch_models(&self, url: &str) -> Result<WireModelList, reqwest::Error> {
        self.client
            .get(url)
            .timeout(Duration::from_secs(MODEL_LIST_TIMEOUT_SECS))
            .send()
            .await?
            .error_for_status()?
            .json::<WireModelList>()
            .await
    }

    /// Issue one HTTP request and classify the status
    async fn send_once(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<Response, AttemptError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = WireRequest {
            model: &self.model,
            messages,
            stream,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::NOT_FOUND {
            let available = self.list_models().await;
            return Err(AttemptError::Fatal(ClientError::ModelNotFound {
                model: self.model.clone(),
                available,
            }));
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Transport(format!("HTTP {}", status)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(AttemptError::Fatal(ClientError::Api {
            status: status.as_u16(),
            body,
        }))
    }

    async fn complete_attempt(&self, messages: &[ChatMessage]) -> Result<String, AttemptError> {
        let response = self.send_once(messages, false).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transport(format!("failed to read body: {}", e)))?;

        let parsed: WireResponse = serde_json::from_str(&body)
            .map_err(|e| AttemptError::Invalid(format!("malformed response: {}", e)))?;

        parsed
            .into_text()
            .ok_or_else(|| AttemptError::Invalid("empty response".to_string()))
    }

    /// One streaming attempt. Text goes straight to the channel; a closed
    /// receiver ends the attempt quietly.
    async fn stream_attempt(
        &self,
        attempt: u32,
        messages: &[ChatMessage],
        tx: &mpsc::Sender<Result<StreamChunk, ClientError>>,
    ) -> Result<(), AttemptError> {
        if attempt > 0 && tx.send(Ok(StreamChunk::Restart)).await.is_err() {
            return Ok(());
        }

        let response = self.send_once(messages, true).await?;
        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut received_text = false;

        while let Some(chunk) = bytes.next().await {
            let chunk =
                chunk.map_err(|e| AttemptError::Transport(format!("stream interrupted: {}", e)))?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();
                let line = String::from_utf8_lossy(&line_bytes);

                let Some(data) = line.trim().strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();

                if data == "[DONE]" {
                    tracing::debug!("[STREAM] Received [DONE]");
                    return if received_text {
                        Ok(())
                    } else {
                        Err(AttemptError::Invalid("empty stream".to_string()))
                    };
                }

                let parsed: WireStreamChunk = serde_json::from_str(data).map_err(|e| {
                    AttemptError::Invalid(format!("malformed stream chunk: {}", e))
                })?;

                let delta = parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .unwrap_or_default();
                if delta.is_empty() {
                    continue;
                }
                if !delta.trim().is_empty() {
                    received_text = true;
                }
                if tx.send(Ok(StreamChunk::Text(delta))).await.is_err() {
                    tracing::debug!("[STREAM] receiver dropped, stopping");
                    return Ok(());
                }
            }
        }

        Err(AttemptError::Transport(
            "stream ended before [DONE]".to_string(),
        ))
    }

    fn exhausted(&self, error: AttemptError) -> ClientError {
        match error {
            AttemptError::Transport(reason) => ClientError::UnreachableBackend {
                url: self.base_url.clone(),
                attempts: self.policy.max_attempts,
                reason,
            },
            AttemptError::Invalid(reason) => ClientError::InvalidResponse {
                attempts: self.policy.max_attempts,
                reason,
            },
            AttemptError::Fatal(e) => e,
        }
    }
}

#[async_trait]
impl InferenceBackend for InferenceClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<Completion, ClientError> {
        if messages.is_empty() {
            return Err(ClientError::EmptyConversation);
        }

        if !stream {
            return self
                .policy
                .run(|_| self.complete_attempt(messages))
                .await
                .map(Completion::Text)
                .map_err(|e| self.exhausted(e));
        }

        let (tx, text_stream) = TextStream::channel(STREAM_BUFFER);
        let this = self.clone();
        let messages = messages.to_vec();

        tokio::spawn(async move {
            tracing::debug!("[STREAM] streaming task started");
            let result = this
                .policy
                .run(|attempt| this.stream_attempt(attempt, &messages, &tx))
                .await;
            if let Err(e) = result {
                let _ = tx.send(Err(this.exhausted(e))).await;
            }
            tracing::debug!("[STREAM] streaming task finished");
        });

        Ok(Completion::Stream(text_stream))
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn model(&self) -> &str {
        &self.model
    }
}
