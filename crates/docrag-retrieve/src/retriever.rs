use std::sync::Arc;

use docrag_core::error::{Error, Result};
use docrag_core::traits::Embedder;
use docrag_core::types::SearchResult;
use docrag_vector::IndexArtifact;
use tracing::{debug, warn};

/// Query-time lookup: embeds the question and maps index hits back to chunks.
///
/// Cheap to clone; the embedder and artifact are shared read-only, so one
/// retriever can serve concurrent callers.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    artifact: Arc<IndexArtifact>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, artifact: Arc<IndexArtifact>) -> Self {
        Self { embedder, artifact }
    }

    pub fn artifact(&self) -> &IndexArtifact {
        &self.artifact
    }

    /// Up to `top_k` chunks closest to `query`, best first. `top_k` larger than
    /// the index is clamped.
    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(Error::InvalidArgument("top_k must be at least 1".into()));
        }
        let query_vec = self
            .embedder
            .embed_batch(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("embedder returned no vector for the query".into()))?;

        let k = top_k.min(self.artifact.len());
        let neighbors = self.artifact.search(&query_vec, k)?;

        let mut results = Vec::with_capacity(neighbors.len());
        for hit in neighbors {
            let Some(chunk) = self.artifact.chunk(hit.position) else {
                warn!(position = hit.position, entries = self.artifact.len(), "hit outside chunk list, skipping");
                continue;
            };
            results.push(SearchResult { chunk: chunk.clone(), score: hit.distance, rank: results.len() + 1 });
        }
        debug!(top_k, returned = results.len(), "search finished");
        Ok(results)
    }
}
