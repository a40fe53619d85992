//! Corpus build and question answering on top of the retriever.

use std::path::PathBuf;
use std::sync::Arc;

use docrag_core::chunker::{chunk_documents, ChunkConfig};
use docrag_core::config::RagConfig;
use docrag_core::error::{Error, Result};
use docrag_core::ingest::{Ingestor, SkippedFile};
use docrag_core::traits::{Embedder, Generator};
use docrag_core::types::{RetrievalContext, SearchResult};
use docrag_vector::{FlatIndex, IndexArtifact};
use serde::Serialize;
use tracing::{info, warn};

use crate::context::ContextAssembler;
use crate::retriever::Retriever;

/// Characters of chunk content shown per used document.
pub const PREVIEW_CHARS: usize = 150;

#[derive(Debug)]
pub struct BuildSummary {
    pub documents: usize,
    pub chunks: usize,
    pub dim: usize,
    pub skipped: Vec<SkippedFile>,
    pub index_dir: PathBuf,
}

/// Ingest `config.data_dir`, chunk, embed every chunk in one batch and write
/// the artifact to `config.index_dir`. Nothing on disk changes unless every
/// step succeeds.
pub fn build_index(config: &RagConfig, embedder: &dyn Embedder) -> Result<BuildSummary> {
    let chunk_config = ChunkConfig::new(config.chunk_size, config.chunk_overlap)?;
    let report = Ingestor::new(config.allowed_extensions.clone())
        .recursive(config.recursive)
        .ingest(&config.data_dir)?;

    let chunks = chunk_documents(&report.documents, chunk_config);
    if chunks.is_empty() {
        warn!(
            documents = report.documents.len(),
            chunk_size = config.chunk_size,
            "no chunks were produced; the index will be empty"
        );
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    info!(chunks = texts.len(), model = embedder.model_id(), "embedding chunks");
    let vectors = if texts.is_empty() { Vec::new() } else { embedder.embed_batch(&texts)? };
    if vectors.len() != chunks.len() {
        return Err(Error::Embedding(format!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    let index = FlatIndex::build(embedder.dim(), vectors)?;
    let artifact = IndexArtifact::new(index, chunks)?;
    artifact.write(&config.index_dir)?;

    let summary = BuildSummary {
        documents: report.documents.len(),
        chunks: artifact.len(),
        dim: artifact.dim(),
        skipped: report.skipped,
        index_dir: config.index_dir.clone(),
    };
    info!(
        documents = summary.documents,
        chunks = summary.chunks,
        skipped = summary.skipped.len(),
        "index build finished"
    );
    Ok(summary)
}

/// The question appended after the rendered context.
pub fn user_prompt(context: &RetrievalContext, query: &str) -> String {
    format!("{}\n\nUsing the documents above, answer the following question: {query}", context.text)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsedDocument {
    pub source_name: String,
    pub extension: String,
    pub score: f32,
    pub preview: String,
}

impl From<&SearchResult> for UsedDocument {
    fn from(result: &SearchResult) -> Self {
        Self {
            source_name: result.chunk.source_name.clone(),
            extension: result.chunk.extension.clone(),
            score: result.score,
            preview: result.preview(PREVIEW_CHARS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub query: String,
    pub content: String,
    /// Every retrieved result, including any cut from the context by the length bound.
    pub used_documents: Vec<UsedDocument>,
}

pub struct RagPipeline {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    system_prompt: Option<String>,
    top_k: usize,
    max_context_chars: usize,
}

impl RagPipeline {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, config: &RagConfig) -> Self {
        Self {
            retriever,
            generator,
            system_prompt: None,
            top_k: config.top_k,
            max_context_chars: config.max_context_chars,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Results and rendered context for `query`, without calling the generator.
    pub fn context(&self, query: &str, top_k: Option<usize>) -> Result<(Vec<SearchResult>, RetrievalContext)> {
        let results = self.retriever.search(query, top_k.unwrap_or(self.top_k))?;
        let context = ContextAssembler::format(&results, self.max_context_chars);
        info!(
            included = context.included_count,
            truncated = context.truncated,
            chars = context.text.chars().count(),
            "context assembled"
        );
        Ok((results, context))
    }

    /// Retrieve, render and ask the generator once. Generator failures are
    /// returned as is.
    pub fn answer(&self, query: &str, top_k: Option<usize>) -> Result<Answer> {
        let (results, context) = self.context(query, top_k)?;
        let prompt = user_prompt(&context, query);
        let content = self.generator.generate(self.system_prompt.as_deref(), &prompt)?;
        Ok(Answer {
            query: query.to_string(),
            content,
            used_documents: results.iter().map(UsedDocument::from).collect(),
        })
    }
}
