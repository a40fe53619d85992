use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No documents found in {dir} (extensions: {extensions})")]
    NoDocumentsFound { dir: PathBuf, extensions: String },

    #[error("Embedding model unavailable: {0}")]
    EmbedderUnavailable(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector at position {position} has zero norm")]
    DegenerateVector { position: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Index artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse grouping used at the service boundary to pick an operator-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// No persisted index exists yet; a build has to run first.
    IndexNotBuilt,
    /// The embedding model could not be initialized.
    EmbedderUnavailable,
    /// Building the corpus failed; nothing was persisted.
    BuildFailed,
    /// A query could not be answered (corrupt index, bad input, ...).
    QueryFailed,
}

/// The kind of work that produced an error, as seen by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Build,
    Query,
}

impl Error {
    /// Category of the error on its own, as raised by the library.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ArtifactMissing(_) => ErrorCategory::IndexNotBuilt,
            Error::EmbedderUnavailable(_) => ErrorCategory::EmbedderUnavailable,
            Error::NoDocumentsFound { .. } | Error::DegenerateVector { .. } | Error::InvalidConfig(_) => {
                ErrorCategory::BuildFailed
            }
            Error::Embedding(_)
            | Error::DimensionMismatch { .. }
            | Error::IndexCorrupt(_)
            | Error::InvalidArgument(_)
            | Error::Io(_) => ErrorCategory::QueryFailed,
        }
    }
}

impl Error {
    /// Category as reported for `operation`. Bad settings while answering a
    /// query are a failed query, and anything short of a missing embedder that
    /// stops a build is a failed build.
    pub fn category_in(&self, operation: Operation) -> ErrorCategory {
        match (self.category(), operation) {
            (ErrorCategory::BuildFailed, Operation::Query) => ErrorCategory::QueryFailed,
            (ErrorCategory::QueryFailed | ErrorCategory::IndexNotBuilt, Operation::Build) => {
                ErrorCategory::BuildFailed
            }
            (category, _) => category,
        }
    }
}

impl ErrorCategory {
    pub fn operator_message(self) -> &'static str {
        match self {
            ErrorCategory::IndexNotBuilt => "no index has been built yet; run `docrag build` first",
            ErrorCategory::EmbedderUnavailable => "the embedding model is unavailable",
            ErrorCategory::BuildFailed => "index build failed; the previous index was left untouched",
            ErrorCategory::QueryFailed => "query failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
