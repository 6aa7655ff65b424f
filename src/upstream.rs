//! Upstream chat dispatch.
//!
//! Two terminal paths per request: buffered (single JSON response, parsed
//! for reply text, finish reason, and usage) and streaming (the response is
//! handed to the relay untouched). Unlike retrieval failures, everything
//! here is user-visible: the request cannot be satisfied without a reply.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::models::{ChatMessage, ChatReply, Role};
use crate::text::truncate_chars;

const MAX_ERROR_BODY_CHARS: usize = 2000;

/// Failures on the generation path.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The provider answered with a non-success status. `body` is truncated
    /// to keep error payloads bounded.
    #[error("upstream returned status {status}")]
    Status { status: u16, body: String },
    /// The provider answered success but the reply text was absent or empty.
    #[error("upstream returned no reply text")]
    NoReply,
    /// Transport failure, or a success response that was not valid JSON.
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Payload sent to the chat completions endpoint.
#[derive(Debug, Serialize)]
pub struct UpstreamPayload {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
}

impl UpstreamPayload {
    /// Assemble the outbound message list: system prompt first, then the
    /// sanitized history, re-capped to `max_messages` total. When the cap
    /// bites, the system prompt is kept and the oldest history drops.
    pub fn new(
        model: String,
        temperature: f32,
        max_tokens: u32,
        stream: bool,
        system_prompt: String,
        history: Vec<ChatMessage>,
        max_messages: usize,
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: Role::System,
            content: system_prompt,
        });
        messages.extend(history);

        if messages.len() > max_messages {
            let system = messages.remove(0);
            let keep_from = messages.len() - (max_messages - 1);
            messages.drain(..keep_from);
            messages.insert(0, system);
        }

        Self {
            model,
            temperature,
            max_tokens,
            stream,
            messages,
        }
    }
}

/// Client for the provider's `POST {base_url}/chat/completions` endpoint.
pub struct UpstreamClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(client: reqwest::Client, provider: &ProviderConfig, api_key: String) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                provider.base_url.trim_end_matches('/')
            ),
            api_key,
            timeout: Duration::from_secs(provider.timeout_secs),
        }
    }

    /// Buffered path: send the payload, parse the single JSON reply.
    pub async fn complete(&self, payload: &UpstreamPayload) -> Result<ChatReply, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS).to_string(),
            });
        }

        let json: serde_json::Value = response.json().await?;
        parse_completion(&json)
    }

    /// Streaming path: open the upstream stream and verify the status.
    ///
    /// The response is returned unread so the relay can forward its bytes
    /// verbatim. No overall deadline is applied: a generation may
    /// legitimately stream for longer than any buffered-call timeout.
    pub async fn open_stream(
        &self,
        payload: &UpstreamPayload,
    ) -> Result<reqwest::Response, UpstreamError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS).to_string(),
            });
        }

        Ok(response)
    }
}

/// Extract reply text, finish reason, and usage from a chat completion.
///
/// An absent or empty `choices[0].message.content` is [`UpstreamError::NoReply`].
fn parse_completion(json: &serde_json::Value) -> Result<ChatReply, UpstreamError> {
    let reply = json
        .pointer("/choices/0/message/content")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("");

    if reply.is_empty() {
        return Err(UpstreamError::NoReply);
    }

    let finish_reason = json
        .pointer("/choices/0/finish_reason")
        .and_then(serde_json::Value::as_str)
        .map(String::from);

    Ok(ChatReply {
        reply: reply.to_string(),
        finish_reason,
        usage: json.get("usage").cloned(),
    })
}
