//! Rendering of ranked results into the text block handed to a generator.
//!
//! The length bound counts Unicode characters, not model tokens. It only
//! approximates a generation budget; a tokenizer-aware bound would be tighter
//! but is not what callers configure against.

use docrag_core::types::{RetrievalContext, SearchResult};

pub const CONTEXT_HEADER: &str = "The following reference documents were retrieved:\n\n";

pub struct ContextAssembler;

impl ContextAssembler {
    /// Concatenate one labelled block per result, in order, while the total
    /// (header included) stays within `max_length` characters. The first block
    /// that would overflow is replaced, together with everything after it, by a
    /// single notice naming how many results were left out. The notice itself is
    /// not counted against the bound.
    pub fn format(results: &[SearchResult], max_length: usize) -> RetrievalContext {
        let mut text = String::from(CONTEXT_HEADER);
        let mut length = CONTEXT_HEADER.chars().count();
        let mut included_count = 0;
        let mut truncated = false;

        for (i, result) in results.iter().enumerate() {
            let block = render_block(i + 1, result);
            let block_len = block.chars().count();
            if length + block_len > max_length {
                let omitted = results.len() - i;
                text.push_str(&format!(
                    "...({omitted} documents omitted: context length limit reached)..."
                ));
                truncated = true;
                break;
            }
            text.push_str(&block);
            length += block_len;
            included_count += 1;
        }

        RetrievalContext { text, truncated, included_count }
    }
}

fn render_block(ordinal: usize, result: &SearchResult) -> String {
    let chunk = &result.chunk;
    let mut block = format!("[Document {ordinal}] {}", chunk.source_name);
    if !chunk.extension.is_empty() {
        block.push_str(&format!(" ({} file)", chunk.extension));
    }
    block.push('\n');
    block.push_str(&chunk.content);
    block.push_str("\n\n");
    block
}
