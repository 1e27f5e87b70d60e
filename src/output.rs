//! Result types returned by a conversion.

use crate::error::AssetError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Title and description extracted from the Markdown source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// First top-level heading, or `"-"`.
    pub title: String,
    /// Description comment content, or `"-"`.
    pub description: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: crate::context::SENTINEL.to_string(),
            description: crate::context::SENTINEL.to_string(),
        }
    }
}

/// An image removed from the document because it could not be localized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedImage {
    pub src: String,
    pub error: Option<AssetError>,
}

/// What post-processing did to the rendered document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessReport {
    /// `<img>` elements rewritten to a local path.
    pub images_localized: usize,
    /// `<img>` elements removed.
    pub images_dropped: Vec<DroppedImage>,
    /// Bare URLs wrapped in links.
    pub links_created: usize,
    /// Whether the logo markup was inserted on this run.
    pub logo_inserted: bool,
    /// Inline `<style>` blocks removed.
    pub style_blocks_removed: usize,
    /// `<img>` elements that received default alt text.
    pub alt_texts_added: usize,
    /// `href="#…"` targets missing from the document (link validation only).
    pub broken_anchors: Vec<String>,
}

/// Aggregate statistics for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// HTTP requests issued for assets.
    pub assets_fetched: usize,
    /// Assets served from disk without a request.
    pub assets_cached: usize,
    pub render_duration_ms: u64,
    pub fetch_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Complete result of a conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub source: PathBuf,
    pub metadata: DocumentMetadata,
    /// Whether a "Table of Contents" heading was written into the source.
    pub toc_title_inserted: bool,
    /// Whether the external formatter ran.
    pub formatted: bool,
    /// Final HTML, present when rendering was enabled.
    pub html_path: Option<PathBuf>,
    /// PDF beside the HTML, present when PDF rendering was enabled.
    pub pdf_path: Option<PathBuf>,
    pub report: Option<PostProcessReport>,
    /// Asset files written by this run, relative to the repository root
    /// when one was found (ready to be staged by the caller).
    pub written_assets: Vec<PathBuf>,
    pub stats: ConversionStats,
}
