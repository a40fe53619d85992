//! Fixed-size, overlapping character windows over document text.
//!
//! Lengths are counted in Unicode scalar values, not bytes or tokens.

use tracing::info;

use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

/// Windows shorter than this are dropped. Documents that fit in a single
/// window are always kept whole, whatever their length.
pub const MIN_CHUNK_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self { chunk_size: 500, overlap: 100 }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking requires 0 <= overlap < chunk_size (got chunk_size={chunk_size}, overlap={overlap})"
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    /// Distance between consecutive window starts.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Split every document and concatenate the chunks in document order.
pub fn chunk_documents(documents: &[Document], config: ChunkConfig) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = documents.iter().flat_map(|doc| chunk_document(doc, config)).collect();
    info!(
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = config.chunk_size,
        overlap = config.overlap,
        "chunked documents"
    );
    chunks
}

/// Split one document.
///
/// Windows start at `0, step, 2*step, ...` for every start inside the text. A
/// window is cut at the end of the text and dropped when that leaves fewer than
/// [`MIN_CHUNK_CHARS`] characters, so a short tail that is not covered by the
/// previous window's overlap is lost.
pub fn chunk_document(doc: &Document, config: ChunkConfig) -> Vec<Chunk> {
    // Byte offset of every char start, plus the end of the text.
    let bounds: Vec<usize> = doc
        .content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(doc.content.len()))
        .collect();
    let char_len = bounds.len() - 1;

    if char_len <= config.chunk_size {
        return vec![make_chunk(doc, doc.content.clone(), 0)];
    }

    let step = config.step();
    (0..char_len)
        .step_by(step)
        .filter_map(|start| {
            let end = (start + config.chunk_size).min(char_len);
            if end - start < MIN_CHUNK_CHARS {
                return None;
            }
            let text = doc.content[bounds[start]..bounds[end]].to_string();
            Some(make_chunk(doc, text, start / step))
        })
        .collect()
}

fn make_chunk(doc: &Document, content: String, chunk_index: usize) -> Chunk {
    Chunk {
        content,
        source_name: doc.source_name.clone(),
        source_path: doc.source_path.clone(),
        extension: doc.extension.clone(),
        chunk_index,
    }
}
