//! Request sanitization.
//!
//! The inbound message list is untrusted JSON. Sanitization is a pure, total
//! function: malformed input degrades to an empty history rather than an
//! error, and the caller treats an empty history as a client error.

use serde_json::Value;

use crate::models::{ChatMessage, Role};

/// Normalize an arbitrary JSON value into a bounded chat history.
///
/// Rules, applied per item:
/// - the role string is coerced to one of system/user/assistant, defaulting
///   to `user` when absent or unrecognized;
/// - content is coerced to a trimmed string, defaulting to empty when it is
///   not a string;
/// - items whose trimmed content is empty are dropped.
///
/// Only the last `max_history` surviving messages are kept, in order. A
/// non-list input yields an empty history.
pub fn sanitize_messages(input: &Value, max_history: usize) -> Vec<ChatMessage> {
    let Some(items) = input.as_array() else {
        return Vec::new();
    };

    let mut messages: Vec<ChatMessage> = Vec::with_capacity(items.len().min(max_history));
    for item in items {
        let role = item
            .get("role")
            .and_then(Value::as_str)
            .map(Role::parse)
            .unwrap_or(Role::User);
        let content = item
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        if content.is_empty() {
            continue;
        }
        messages.push(ChatMessage {
            role,
            content: content.to_string(),
        });
    }

    if messages.len() > max_history {
        messages.split_off(messages.len() - max_history)
    } else {
        messages
    }
}
