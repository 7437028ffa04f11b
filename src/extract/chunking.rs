/// A slice of the input text sent to the model on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextChunk<'a> {
    /// Character offset of the chunk within the full text.
    pub char_offset: usize,
    pub text: &'a str,
}

/// Splits `text` into chunks of at most `max_chars` characters.
///
/// Chunks break at the last whitespace before the limit when there is one;
/// a single word longer than the limit is cut. Whitespace-only chunks are
/// dropped.
pub(crate) fn chunk_text(text: &str, max_chars: usize) -> Vec<TextChunk<'_>> {
    let max_chars = max_chars.max(1);
    let indices: Vec<(usize, char)> = text.char_indices().collect();
    let byte_at = |char_idx: usize| {
        indices
            .get(char_idx)
            .map(|(byte, _)| *byte)
            .unwrap_or(text.len())
    };

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < indices.len() {
        let mut end = (start + max_chars).min(indices.len());
        if end < indices.len() {
            if let Some(split) = (start + 1..=end).rev().find(|&i| indices[i].1.is_whitespace()) {
                end = split;
            }
        }

        let slice = &text[byte_at(start)..byte_at(end)];
        if !slice.trim().is_empty() {
            chunks.push(TextChunk {
                char_offset: start,
                text: slice,
            });
        }
        start = end;
    }
    chunks
}
