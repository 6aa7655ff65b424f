//! Core data types used throughout context-relay.
//!
//! These types represent the messages, embeddings, and retrieval results that
//! flow through the gateway pipeline.

use serde::{Deserialize, Serialize};

/// Chat message role. Unrecognized roles in caller input are coerced to
/// [`Role::User`] during sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Parse a role string, coercing anything unrecognized to `user`.
    pub fn parse(s: &str) -> Role {
        match s {
            "system" => Role::System,
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

/// A sanitized chat message. Content is always non-empty and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Inbound chat request body.
///
/// `messages` is kept as a raw JSON value: callers are untrusted, so shape
/// coercion is the sanitizer's job rather than the deserializer's. A missing
/// or malformed list degrades to an empty history, which the handler rejects
/// as a client error.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: serde_json::Value,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub stream: bool,
}

/// One corpus entry paired with its embedding vector. Produced once per
/// process by the knowledge index fill.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub topic: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A ranked retrieval match. `score` is cosine similarity in `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub topic: String,
    pub text: String,
    pub score: f32,
}

/// Parsed buffered reply from the chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub reply: String,
    pub finish_reason: Option<String>,
    /// Provider token-usage object, passed through verbatim.
    pub usage: Option<serde_json::Value>,
}
