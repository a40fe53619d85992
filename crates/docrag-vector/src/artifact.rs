//! The persisted index: `index.bin` plus the aligned `chunks.json`, written and
//! loaded as one unit.
//!
//! Each write lands in a fresh `gen-*` directory under the index directory and
//! is published by atomically replacing the `CURRENT` file, which names the live
//! generation. The index directory therefore always resolves to a complete
//! artifact, even while a rebuild is running or after one crashed halfway.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use docrag_core::error::{Error, Result};
use docrag_core::types::Chunk;
use tracing::{debug, info, warn};

use crate::codec::{decode_index, encode_index};
use crate::flat::{FlatIndex, Neighbor};

pub const INDEX_FILE: &str = "index.bin";
pub const CHUNKS_FILE: &str = "chunks.json";
pub const CURRENT_FILE: &str = "CURRENT";

const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";
/// Times a load re-resolves `CURRENT` after the generation it read vanished.
const LOAD_ATTEMPTS: usize = 8;

/// A vector index together with the chunk each row was embedded from.
/// Row `i` of `index` belongs to `chunks[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexArtifact {
    index: FlatIndex,
    chunks: Vec<Chunk>,
}

impl IndexArtifact {
    pub fn new(index: FlatIndex, chunks: Vec<Chunk>) -> Result<Self> {
        if index.len() != chunks.len() {
            return Err(Error::InvalidArgument(format!(
                "index has {} vectors but {} chunks were supplied",
                index.len(),
                chunks.len()
            )));
        }
        Ok(Self { index, chunks })
    }

    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.index.search(query, k)
    }

    /// Write both files into a new generation under `dir` and make it current.
    /// On any error the previous generation stays current.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let chunks_json = serde_json::to_vec_pretty(&self.chunks)
            .map_err(|e| Error::InvalidArgument(format!("cannot serialize chunks: {e}")))?;
        let checksum: [u8; 32] = *blake3::hash(&chunks_json).as_bytes();
        let index_bytes = encode_index(&self.index, &checksum)?;

        fs::create_dir_all(dir)?;
        let previous = current_generation(dir).unwrap_or_else(|e| {
            warn!(dir = %dir.display(), error = %e, "ignoring unreadable CURRENT, it will be replaced");
            None
        });

        let staging = tempfile::Builder::new().prefix(STAGING_PREFIX).tempdir_in(dir)?;
        fs::write(staging.path().join(CHUNKS_FILE), &chunks_json)?;
        fs::write(staging.path().join(INDEX_FILE), &index_bytes)?;
        set_mode(staging.path(), 0o755)?;
        debug!(staging = %staging.path().display(), "artifact staged");

        let staged = staging.keep();
        let suffix = staged
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(STAGING_PREFIX))
            .unwrap_or_default()
            .to_string();
        let generation = format!("{GENERATION_PREFIX}{suffix}");
        if let Err(e) = fs::rename(&staged, dir.join(&generation)) {
            if let Err(cleanup) = fs::remove_dir_all(&staged) {
                warn!(staging = %staged.display(), error = %cleanup, "could not remove staging directory");
            }
            return Err(e.into());
        }

        if let Err(e) = publish(dir, &generation) {
            if let Err(cleanup) = fs::remove_dir_all(dir.join(&generation)) {
                warn!(generation = %generation, error = %cleanup, "could not remove unpublished generation");
            }
            return Err(e);
        }
        prune(dir, &generation, previous.as_deref());

        info!(
            dir = %dir.display(),
            generation = %generation,
            entries = self.len(),
            dim = self.dim(),
            "index artifact written"
        );
        Ok(())
    }

    /// Read the current artifact under `dir`, refusing any pair of files that
    /// do not belong together.
    ///
    /// A directory without `CURRENT` is read as a flat pair of files, which is
    /// also how a never-built index reports [`Error::ArtifactMissing`].
    pub fn load(dir: &Path) -> Result<Self> {
        let mut attempt = 1;
        loop {
            let resolved = Self::current_dir(dir)?;
            match load_generation(&resolved) {
                Err(Error::ArtifactMissing(path))
                    if attempt < LOAD_ATTEMPTS && Self::current_dir(dir)? != resolved =>
                {
                    debug!(missing = %path.display(), attempt, "generation replaced during load, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
                Ok(artifact) => {
                    info!(
                        dir = %dir.display(),
                        entries = artifact.len(),
                        dim = artifact.dim(),
                        "index artifact loaded"
                    );
                    return Ok(artifact);
                }
            }
        }
    }

    /// Directory holding the files of the artifact that is current under `dir`.
    pub fn current_dir(dir: &Path) -> Result<PathBuf> {
        Ok(match current_generation(dir)? {
            Some(generation) => dir.join(generation),
            None => dir.to_path_buf(),
        })
    }
}

fn load_generation(dir: &Path) -> Result<IndexArtifact> {
    let index_path = dir.join(INDEX_FILE);
    let chunks_path = dir.join(CHUNKS_FILE);
    for path in [&index_path, &chunks_path] {
        if !path.is_file() {
            return Err(Error::ArtifactMissing(path.clone()));
        }
    }

    let index_bytes = read_part(&index_path)?;
    let (header, index) = decode_index(&index_bytes)?;

    let chunks_json = read_part(&chunks_path)?;
    let chunks: Vec<Chunk> = serde_json::from_slice(&chunks_json)
        .map_err(|e| Error::IndexCorrupt(format!("{} is not a valid chunk list: {e}", chunks_path.display())))?;

    if header.count != chunks.len() {
        return Err(Error::IndexCorrupt(format!(
            "index holds {} vectors but {} lists {} chunks",
            header.count,
            chunks_path.display(),
            chunks.len()
        )));
    }
    if blake3::hash(&chunks_json).as_bytes() != &header.chunks_checksum {
        return Err(Error::IndexCorrupt(format!(
            "{} was not written together with {}",
            chunks_path.display(),
            index_path.display()
        )));
    }
    Ok(IndexArtifact { index, chunks })
}

fn read_part(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::ArtifactMissing(path.to_path_buf()),
        _ => Error::Io(e),
    })
}

fn is_generation_name(name: &str) -> bool {
    name.strip_prefix(GENERATION_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
}

fn current_generation(dir: &Path) -> Result<Option<String>> {
    let pointer = dir.join(CURRENT_FILE);
    let name = match fs::read_to_string(&pointer) {
        Ok(name) => name,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let name = name.trim();
    if !is_generation_name(name) {
        return Err(Error::IndexCorrupt(format!("{} does not name a generation: {name:?}", pointer.display())));
    }
    Ok(Some(name.to_string()))
}

/// Point `CURRENT` at `generation` with a single rename.
fn publish(dir: &Path, generation: &str) -> Result<()> {
    let mut pointer = tempfile::Builder::new().prefix(".current-").tempfile_in(dir)?;
    writeln!(pointer, "{generation}")?;
    pointer.as_file().sync_all()?;
    set_mode(pointer.path(), 0o644)?;
    pointer.persist(dir.join(CURRENT_FILE)).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Remove generations older than `previous`, plus the flat files of an
/// artifact written before generations existed. `previous` is kept for
/// readers that resolved it just before the switch.
fn prune(dir: &Path, current: &str, previous: Option<&str>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not list old generations");
            return;
        }
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_generation_name(&name) || name == current || Some(name.as_str()) == previous {
            continue;
        }
        if let Err(e) = fs::remove_dir_all(entry.path()) {
            warn!(generation = %name, error = %e, "could not remove old generation");
        }
    }
    for legacy in [INDEX_FILE, CHUNKS_FILE] {
        let path = dir.join(legacy);
        if path.is_file() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "could not remove flat artifact file");
            }
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
