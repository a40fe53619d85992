use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use docrag_core::error::Result;
use docrag_vector::IndexArtifact;
use tracing::{error, info};

/// Process-wide handle to the persisted index, loaded on first use.
///
/// Concurrent first callers serialize on the mutex, so the artifact is read
/// from disk once. A failed load leaves the handle empty and the next call
/// tries again.
pub struct SharedIndex {
    dir: PathBuf,
    slot: Mutex<Option<Arc<IndexArtifact>>>,
}

impl SharedIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), slot: Mutex::new(None) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self) -> Result<Arc<IndexArtifact>> {
        let mut slot = self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(artifact) = slot.as_ref() {
            return Ok(Arc::clone(artifact));
        }
        let artifact = IndexArtifact::load(&self.dir).map(Arc::new).map_err(|e| {
            error!(dir = %self.dir.display(), error = %e, "index load failed");
            e
        })?;
        info!(dir = %self.dir.display(), entries = artifact.len(), "shared index ready");
        *slot = Some(Arc::clone(&artifact));
        Ok(artifact)
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}
