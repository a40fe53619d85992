//! docrag-embed
//!
//! Embedder implementations behind `docrag_core::traits::Embedder`: a candle
//! sentence encoder for real corpora and a hashing embedder for tests. The
//! model is expensive to load, so callers construct it once and share the
//! `Arc<dyn Embedder>`; [`EmbedderCell`] does that lazily.

mod hash;
mod model;
pub mod pool;
pub mod tokenize;

use std::sync::{Arc, OnceLock};

use docrag_core::config::{EmbeddingBackend, RagConfig};
use docrag_core::error::{Error, Result};
use docrag_core::traits::Embedder;
use tracing::{error, info};

pub use hash::HashEmbedder;
pub use model::{resolve_model_dir, CandleEmbedder};
pub use pool::masked_mean_l2;

/// Construct the embedder selected by `config`. Any failure to initialize is
/// reported as [`Error::EmbedderUnavailable`].
pub fn load_embedder(config: &RagConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedding_backend {
        EmbeddingBackend::Hash => {
            info!(dim = config.hash_dim, "using hashing embedder");
            Ok(Arc::new(HashEmbedder::new(config.hash_dim)))
        }
        EmbeddingBackend::Candle => {
            let model = resolve_model_dir(&config.model_identifier, &config.models_dir)
                .and_then(|dir| CandleEmbedder::load(&dir, &config.model_identifier))
                .map_err(|e| Error::EmbedderUnavailable(format!("{e:#}")))?;
            Ok(Arc::new(model))
        }
    }
}

type Factory = Box<dyn Fn() -> Result<Arc<dyn Embedder>> + Send + Sync>;

/// Lazily constructed, process-shared embedder.
///
/// The factory runs at most once even when several threads ask at the same
/// time. If it fails, every later [`EmbedderCell::get`] reports
/// `EmbedderUnavailable` with the original message.
pub struct EmbedderCell {
    factory: Factory,
    slot: OnceLock<std::result::Result<Arc<dyn Embedder>, String>>,
}

impl EmbedderCell {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Embedder>> + Send + Sync + 'static,
    {
        Self { factory: Box::new(factory), slot: OnceLock::new() }
    }

    pub fn from_config(config: RagConfig) -> Self {
        Self::new(move || load_embedder(&config))
    }

    pub fn get(&self) -> Result<Arc<dyn Embedder>> {
        let slot = self.slot.get_or_init(|| {
            (self.factory)().map_err(|e| {
                error!(error = %e, "embedder initialization failed");
                match e {
                    Error::EmbedderUnavailable(msg) => msg,
                    other => other.to_string(),
                }
            })
        });
        match slot {
            Ok(embedder) => Ok(Arc::clone(embedder)),
            Err(msg) => Err(Error::EmbedderUnavailable(msg.clone())),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }
}
