use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::errors::{GrounderError, GrounderResult};
use crate::llm::sse::{self, SseChunk};
use crate::llm::types::{ChatMessage, SamplingParams};

/// Upper bound on one completion call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Inference collaborator: turns a conversation into model text.
///
/// The control loop only needs [`complete`](Inference::complete); the
/// single-turn runner prefers [`complete_stream`](Inference::complete_stream),
/// which falls back to one whole-reply chunk for non-streaming backends.
#[async_trait]
pub trait Inference: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        params: &SamplingParams,
    ) -> GrounderResult<String>;

    /// Stream incremental text chunks into `chunks` and return the full
    /// accumulated reply.
    async fn complete_stream(
        &self,
        messages: Vec<ChatMessage>,
        params: &SamplingParams,
        chunks: mpsc::Sender<String>,
    ) -> GrounderResult<String> {
        let text = self.complete(messages, params).await?;
        if !text.is_empty() {
            let _ = chunks.send(text.clone()).await;
        }
        Ok(text)
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url,
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
        stream: bool,
    ) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "max_tokens": params.max_length,
            "temperature": params.temperature,
            "presence_penalty": params.presence_penalty,
            "top_p": params.top_p,
        })
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        params: &SamplingParams,
        stream: bool,
    ) -> GrounderResult<reqwest::Response> {
        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            stream,
            "sending completion request"
        );
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&self.request_body(messages, params, stream))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(GrounderError::Inference(format!("{status}: {err_body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl Inference for OpenAiCompatibleClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        params: &SamplingParams,
    ) -> GrounderResult<String> {
        let response = self.send(&messages, params, false).await?;
        let json: serde_json::Value = response.json().await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        tracing::info!(content_len = content.len(), "completion received");
        Ok(content)
    }

    async fn complete_stream(
        &self,
        messages: Vec<ChatMessage>,
        params: &SamplingParams,
        chunks: mpsc::Sender<String>,
    ) -> GrounderResult<String> {
        let response = self.send(&messages, params, true).await?;

        let mut byte_stream = response.bytes_stream();
        let mut line_buf = String::new();
        let mut content = String::new();

        'stream: while let Some(result) = byte_stream.next().await {
            let bytes = result?;
            let text = String::from_utf8_lossy(&bytes);

            for ch in text.chars() {
                if ch != '\n' {
                    line_buf.push(ch);
                    continue;
                }
                let line = line_buf.trim().to_string();
                line_buf.clear();
                if line.is_empty() {
                    continue;
                }

                match sse::parse_sse_line(&line) {
                    Ok(Some(SseChunk::Content(delta))) => {
                        content.push_str(&delta);
                        let _ = chunks.send(delta).await;
                    }
                    Ok(Some(SseChunk::Done)) => break 'stream,
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!("SSE parse skipped: {e}");
                    }
                }
            }
        }

        tracing::info!(content_len = content.len(), "completion stream finished");
        Ok(content)
    }
}
