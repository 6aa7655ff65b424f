//! Small text helpers shared across the pipeline.

/// Truncate a string to at most `max` characters.
///
/// Operates on character counts, not bytes, so multi-byte text is never cut
/// mid-codepoint.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
