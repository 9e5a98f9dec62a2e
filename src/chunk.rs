//! Fixed-size overlapping text chunker.
//!
//! Splits extracted document text into chunks of at most `chunk_chars`
//! characters, each overlapping its predecessor by `overlap_chars` so that
//! context spanning a boundary survives retrieval. Chunk order is
//! deterministic: vector ids are derived from `(filename, index)`, and
//! re-chunking the same text must reproduce the same ids.

/// Deterministic vector-index id for a chunk of `filename`.
pub fn chunk_id(filename: &str, index: i64) -> String {
    format!("{}_{}", filename, index)
}

/// Split `text` into overlapping chunks. Indices are implicit: position in
/// the returned vector. Empty input yields no chunks.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
    debug_assert!(chunk_chars > overlap_chars);

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = chunk_chars - overlap_chars;
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}
