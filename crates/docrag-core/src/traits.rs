use crate::error::Result;
use crate::types::EmbeddingVector;

/// Text embedding capability.
///
/// Implementations are constructed once and shared read-only (`Arc<dyn Embedder>`)
/// between the build path and any number of concurrent query callers.
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model, recorded for diagnostics.
    fn model_id(&self) -> &str;
    /// Output dimension D; constant for the lifetime of the instance.
    fn dim(&self) -> usize;
    /// One vector per input text, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>>;
}

/// Downstream text generation. Receives the rendered retrieval context and the
/// question and returns the reply verbatim.
pub trait Generator: Send + Sync {
    fn generate(&self, system_prompt: Option<&str>, user_prompt: &str) -> Result<String>;
}
