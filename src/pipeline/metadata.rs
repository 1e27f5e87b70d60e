//! Metadata extraction: document title and description from the source text.
//!
//! The title is the first top-level heading (`# Title`); the description is
//! the content of a `<!-- description: … -->` comment. Either falls back to
//! the `"-"` sentinel when absent, which is never an error.
//!
//! [`MetadataCache`] avoids re-reading unchanged files in long-lived
//! processes. Entries are keyed by canonical path and validated against a
//! [`Fingerprint`] of modification time and size, so an edited file is always
//! re-scanned.

use crate::context::SENTINEL;
use crate::error::Md2HtmlError;
use crate::output::DocumentMetadata;
use crate::pipeline::markdown::{heading, prose_lines};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

static RE_DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--.*?description:\s*(.*?)\s*-->").unwrap());

/// Extract title and description from Markdown text.
pub fn extract(source: &str) -> DocumentMetadata {
    DocumentMetadata {
        title: extract_title(source).unwrap_or_else(|| SENTINEL.to_string()),
        description: extract_description(source).unwrap_or_else(|| SENTINEL.to_string()),
    }
}

fn extract_title(source: &str) -> Option<String> {
    prose_lines(source)
        .find(|line| line.text.starts_with("# "))
        .and_then(|line| heading(line.text))
        .map(|(_, text)| text.to_string())
        .filter(|t| !t.is_empty())
}

fn extract_description(source: &str) -> Option<String> {
    prose_lines(source)
        .find_map(|line| RE_DESCRIPTION.captures(line.text))
        .map(|caps| caps[1].to_string())
}

/// Read `path` and extract its metadata.
pub async fn extract_from_file(path: &Path) -> Result<DocumentMetadata, Md2HtmlError> {
    let text = read_source(path).await?;
    Ok(extract(&text))
}

pub(crate) async fn read_source(path: &Path) -> Result<String, Md2HtmlError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| source_error(path, e))
}

fn source_error(path: &Path, e: std::io::Error) -> Md2HtmlError {
    match e.kind() {
        std::io::ErrorKind::NotFound => Md2HtmlError::SourceNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => Md2HtmlError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => Md2HtmlError::SourceRead {
            path: path.to_path_buf(),
            source: e,
        },
    }
}

/// Identity of a file's content as far as the cache is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl Fingerprint {
    pub async fn of(path: &Path) -> Result<Self, Md2HtmlError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| source_error(path, e))?;
        Ok(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

/// Process-wide metadata cache, safe for concurrent lookups and inserts.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: DashMap<PathBuf, (Fingerprint, DocumentMetadata)>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return cached metadata for `path` if its fingerprint is unchanged,
    /// otherwise scan the file and remember the result.
    pub async fn load(&self, path: &Path) -> Result<DocumentMetadata, Md2HtmlError> {
        let fingerprint = Fingerprint::of(path).await?;

        if let Some(entry) = self.entries.get(path) {
            let (cached_fp, metadata) = entry.value();
            if *cached_fp == fingerprint {
                debug!("Metadata cache hit: {}", path.display());
                return Ok(metadata.clone());
            }
        }

        let metadata = extract_from_file(path).await?;
        self.entries
            .insert(path.to_path_buf(), (fingerprint, metadata.clone()));
        debug!("Metadata cache miss: {}", path.display());
        Ok(metadata)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
