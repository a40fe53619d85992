//! Domain types shared by ingestion, indexing and retrieval.

use serde::{Deserialize, Serialize};

/// An embedding vector. Its length is the dimension of the model that produced it.
pub type EmbeddingVector = Vec<f32>;

/// One source file after decoding.
///
/// - `content`: decoded text, trimmed
/// - `source_name`: file name without directories
/// - `source_path`: path the file was read from
/// - `extension`: lowercased extension including the leading dot (may be empty)
/// - `encoding`: label of the encoding that decoded the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub source_name: String,
    pub source_path: String,
    pub extension: String,
    pub encoding: String,
}

/// A passage of a document; the unit that gets embedded and retrieved.
///
/// `chunk_index` is the window start offset divided by the window step, so it
/// starts at 0 and grows strictly within a document, with gaps where a window
/// was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub source_name: String,
    pub source_path: String,
    pub extension: String,
    pub chunk_index: usize,
}

/// A retrieved chunk. `score` is the squared Euclidean distance between the
/// normalized query and chunk vectors, so lower is better. `rank` starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub score: f32,
    pub rank: usize,
}

impl SearchResult {
    /// First `max_chars` characters of the content, with `...` appended when cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let content = &self.chunk.content;
        match content.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &content[..cut]),
            None => content.clone(),
        }
    }
}

/// Ranked results rendered into a bounded block of text for a generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalContext {
    pub text: String,
    pub truncated: bool,
    pub included_count: usize,
}
