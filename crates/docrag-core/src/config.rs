//! Configuration value object and path helpers.
//!
//! Uses Figment to merge built-in defaults + `docrag.toml` + `docrag.<env>.toml`
//! + `DOCRAG_*` env vars. Provides helpers to expand `~` and `${VAR}` and to
//! resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Which embedding implementation the build and query paths construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local transformer weights loaded with candle.
    Candle,
    /// Deterministic token-hashing embedder (tests and offline development).
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub index_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Upper bound on the rendered context, in characters (not tokens).
    pub max_context_chars: usize,
    #[serde(deserialize_with = "deserialize_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Descend into subdirectories of `data_dir`.
    pub recursive: bool,
    pub model_identifier: String,
    pub models_dir: PathBuf,
    pub embedding_backend: EmbeddingBackend,
    pub hash_dim: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            index_dir: PathBuf::from("embeddings"),
            chunk_size: 500,
            chunk_overlap: 100,
            top_k: 5,
            max_context_chars: 3000,
            allowed_extensions: vec![".md".to_string(), ".txt".to_string()],
            recursive: false,
            model_identifier: "jhgan/ko-sroberta-multitask".to_string(),
            models_dir: PathBuf::from("models"),
            embedding_backend: EmbeddingBackend::Candle,
            hash_dim: 384,
        }
    }
}

impl RagConfig {
    /// Load from the current directory, picking the overlay file from `RUST_ENV`.
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let config: Self = Self::figment(&env_name)
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validated()
    }

    pub fn figment(env_name: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(RagConfig::default()))
            .merge(Toml::file("docrag.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("docrag.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("docrag.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("docrag.test.toml")),
            _ => {}
        }
        figment.merge(Env::prefixed("DOCRAG_"))
    }

    /// Normalize extensions and reject settings the pipeline cannot run with.
    pub fn validated(mut self) -> Result<Self> {
        self.allowed_extensions = normalize_extensions(&self.allowed_extensions);
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be at least 1".into()));
        }
        if self.max_context_chars == 0 {
            return Err(Error::InvalidConfig("max_context_chars must be positive".into()));
        }
        if self.allowed_extensions.is_empty() {
            return Err(Error::InvalidConfig("allowed_extensions is empty".into()));
        }
        if self.embedding_backend == EmbeddingBackend::Hash && self.hash_dim == 0 {
            return Err(Error::InvalidConfig("hash_dim must be positive".into()));
        }
        Ok(self)
    }

    /// Expand and anchor the configured directories at `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        self.data_dir = resolve_with_base(base, self.data_dir.to_string_lossy());
        self.index_dir = resolve_with_base(base, self.index_dir.to_string_lossy());
        self.models_dir = resolve_with_base(base, self.models_dir.to_string_lossy());
        self
    }
}

/// Trim, lowercase and prefix each extension with a dot; drop blanks and duplicates.
pub fn normalize_extensions<S: AsRef<str>>(extensions: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ext in extensions {
        let ext = ext.as_ref().trim().to_lowercase();
        if ext.is_empty() || ext == "." {
            continue;
        }
        let ext = if ext.starts_with('.') { ext } else { format!(".{ext}") };
        if !out.contains(&ext) {
            out.push(ext);
        }
    }
    out
}

// Accepts either a list or the comma-separated form used in env vars (".md,.txt").
fn deserialize_extensions<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Extensions {
        Csv(String),
        List(Vec<String>),
    }

    Ok(match Extensions::deserialize(deserializer)? {
        Extensions::Csv(s) => s.split(',').map(str::to_string).collect(),
        Extensions::List(list) => list,
    })
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
