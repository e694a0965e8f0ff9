//! Input cleanup for the embedding service.

/// Maximum characters sent to the embedding service per text.
pub const MAX_EMBEDDING_CHARS: usize = 8000;

/// Cleans `text` for embedding.
///
/// Trims, collapses whitespace runs to single spaces, strips null bytes and
/// truncates to `max_chars` characters. An empty return value means the text
/// must not be sent.
pub fn normalize_for_embedding(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned: String = collapsed.chars().filter(|&c| c != '\0').collect();
    truncate_chars(&cleaned, max_chars).to_string()
}

/// Returns at most the first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
