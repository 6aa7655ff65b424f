//! System prompt assembly.
//!
//! The final system prompt is a fixed base instruction, optionally followed
//! by a context block. The block merges caller-supplied context (first) with
//! retrieved corpus snippets in descending-score order, and is truncated to
//! a bounded length before being embedded in the prompt.

use crate::models::RetrievalResult;
use crate::text::truncate_chars;

/// Base instruction prepended to every conversation.
pub const BASE_INSTRUCTION: &str = "You are a knowledgeable assistant. Keep answers concise and \
actionable. Ask clarifying questions when a request is unclear, and say so explicitly when your \
confidence in an answer is low.";

const CONTEXT_PREAMBLE: &str = "Use this context when relevant:";
const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Build the system prompt for one request.
///
/// With no caller context and no retrieval results, the prompt is just the
/// base instruction. Otherwise caller context comes first, then each
/// retained snippet rendered as `Context #<rank> (score <pct>%): <text>`,
/// all delimiter-joined and truncated to `max_context_chars`.
pub fn build_system_prompt(
    caller_context: Option<&str>,
    results: &[RetrievalResult],
    max_context_chars: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(context) = caller_context {
        let context = context.trim();
        if !context.is_empty() {
            parts.push(context.to_string());
        }
    }

    for (rank, result) in results.iter().enumerate() {
        parts.push(format!(
            "Context #{} (score {:.0}%): {}",
            rank + 1,
            result.score * 100.0,
            result.text
        ));
    }

    if parts.is_empty() {
        return BASE_INSTRUCTION.to_string();
    }

    let merged = parts.join(CONTEXT_DELIMITER);
    let merged = truncate_chars(&merged, max_context_chars);

    format!("{BASE_INSTRUCTION}\n\n{CONTEXT_PREAMBLE}\n\n{merged}")
}
