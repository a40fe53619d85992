//! Reads a directory of text files into [`Document`]s.
//!
//! Each file is decoded with the first encoding of [`ENCODING_FALLBACK`] that
//! accepts its bytes. Per-file problems are recorded in the [`IngestReport`]
//! and never abort the batch; only an empty result is an error.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::types::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Cp949,
    EucKr,
    Latin1,
}

/// Decoding order; the first encoding that decodes without error wins.
pub const ENCODING_FALLBACK: [TextEncoding; 4] =
    [TextEncoding::Utf8, TextEncoding::Cp949, TextEncoding::EucKr, TextEncoding::Latin1];

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Cp949 => "cp949",
            TextEncoding::EucKr => "euc-kr",
            TextEncoding::Latin1 => "latin-1",
        }
    }

    /// Strict decode: `None` if the bytes are not valid in this encoding.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                encoding_rs::UTF_8
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .map(|s| s.into_owned())
            }
            // encoding_rs implements the WHATWG "EUC-KR" decoder, which is windows-949.
            TextEncoding::Cp949 => encoding_rs::EUC_KR
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|s| s.into_owned()),
            TextEncoding::EucKr => {
                if !is_strict_euc_kr(bytes) {
                    return None;
                }
                encoding_rs::EUC_KR
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .map(|s| s.into_owned())
            }
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

// KS X 1001 only: every non-ASCII byte pair must be in 0xA1..=0xFE.
fn is_strict_euc_kr(bytes: &[u8]) -> bool {
    let mut iter = bytes.iter();
    while let Some(&b) = iter.next() {
        if b < 0x80 {
            continue;
        }
        if !(0xA1..=0xFE).contains(&b) {
            return false;
        }
        match iter.next() {
            Some(&t) if (0xA1..=0xFE).contains(&t) => {}
            _ => return false,
        }
    }
    true
}

/// Decode `bytes` with the fallback list, returning the text and the encoding used.
pub fn decode_with_fallback(bytes: &[u8]) -> Option<(String, TextEncoding)> {
    ENCODING_FALLBACK
        .iter()
        .find_map(|&enc| enc.decode(bytes).map(|text| (text, enc)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing left after trimming whitespace.
    Empty,
    /// No encoding in the fallback list accepted the bytes.
    Undecodable,
    /// The file could not be read.
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone)]
pub struct Ingestor {
    allowed_extensions: Vec<String>,
    recursive: bool,
}

impl Ingestor {
    /// `allowed_extensions` are expected in normalized form (`.md`), see
    /// [`crate::config::normalize_extensions`].
    pub fn new(allowed_extensions: Vec<String>) -> Self {
        Self { allowed_extensions, recursive: false }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// The documents of [`Ingestor::ingest`], with skips only logged.
    pub fn read_documents(&self, directory: &Path) -> Result<Vec<Document>> {
        Ok(self.ingest(directory)?.documents)
    }

    pub fn ingest(&self, directory: &Path) -> Result<IngestReport> {
        let files = self.list_files(directory);
        info!(dir = %directory.display(), files = files.len(), "collected candidate files");

        let mut report = IngestReport::default();
        for path in files {
            match self.read_one(&path) {
                Ok(doc) => report.documents.push(doc),
                Err(reason) => {
                    match &reason {
                        SkipReason::Empty => warn!(path = %path.display(), "skipping empty file"),
                        SkipReason::Undecodable => {
                            error!(path = %path.display(), "no encoding could decode file")
                        }
                        SkipReason::Unreadable(e) => {
                            error!(path = %path.display(), error = %e, "failed to read file")
                        }
                    }
                    report.skipped.push(SkippedFile { path, reason });
                }
            }
        }

        if report.documents.is_empty() {
            return Err(Error::NoDocumentsFound {
                dir: directory.to_path_buf(),
                extensions: self.allowed_extensions.join(","),
            });
        }
        info!(documents = report.documents.len(), skipped = report.skipped.len(), "ingestion finished");
        Ok(report)
    }

    fn read_one(&self, path: &Path) -> std::result::Result<Document, SkipReason> {
        let bytes = fs::read(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
        let (text, encoding) = decode_with_fallback(&bytes).ok_or(SkipReason::Undecodable)?;
        debug!(path = %path.display(), encoding = encoding.label(), "decoded file");
        let content = text.trim();
        if content.is_empty() {
            return Err(SkipReason::Empty);
        }
        Ok(Document {
            content: content.to_string(),
            source_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_path: path.to_string_lossy().into_owned(),
            extension: path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                .unwrap_or_default(),
            encoding: encoding.label().to_string(),
        })
    }

    // A file can match several patterns (".txt" and ".old.txt"); the set keeps one
    // entry per path, in sorted order.
    fn list_files(&self, root: &Path) -> BTreeSet<PathBuf> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = BTreeSet::new();
        for ext in &self.allowed_extensions {
            let mut matched = 0usize;
            for entry in walkdir::WalkDir::new(root)
                .max_depth(max_depth)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                if name.len() > ext.len() && name.ends_with(ext.as_str()) {
                    files.insert(entry.path().to_path_buf());
                    matched += 1;
                }
            }
            debug!(extension = %ext, matched, "matched files for extension");
        }
        files
    }
}
