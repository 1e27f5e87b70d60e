//! Per-conversion state threaded through every stage.

use crate::pipeline::paths::ResolvedPaths;
use std::path::PathBuf;
use tempfile::TempPath;

/// Placeholder for metadata that was not found in the source.
pub const SENTINEL: &str = "-";

/// The unit of state for one conversion.
///
/// Owned by the orchestrator; each stage receives `&mut ConversionContext`,
/// updates the fields it is responsible for, and keeps no reference to it.
#[derive(Debug)]
pub struct ConversionContext {
    pub source: PathBuf,
    pub output: PathBuf,
    pub repo_root: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub images_dir: PathBuf,
    pub styles_dir: PathBuf,
    /// First top-level heading, or [`SENTINEL`].
    pub title: String,
    /// `<!-- description: … -->` content, or [`SENTINEL`].
    pub description: String,
    /// Href of the managed stylesheet relative to the output file, once ensured.
    pub stylesheet_href: Option<String>,
    /// Renderer output awaiting post-processing.
    pub document: Option<RenderedDocument>,
}

impl ConversionContext {
    pub fn new(paths: ResolvedPaths) -> Self {
        Self {
            source: paths.source,
            output: paths.output,
            repo_root: paths.repo_root,
            source_dir: paths.source_dir,
            images_dir: paths.images_dir,
            styles_dir: paths.styles_dir,
            title: SENTINEL.to_string(),
            description: SENTINEL.to_string(),
            stylesheet_href: None,
            document: None,
        }
    }

    /// Directory the output file lives in; asset hrefs are relative to it.
    pub fn output_dir(&self) -> PathBuf {
        self.output
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn has_description(&self) -> bool {
        self.description != SENTINEL
    }
}

/// HTML produced by the external renderer.
///
/// `temp` owns the renderer's output file; dropping it removes the file, so
/// the file never outlives the conversion even when a later stage fails.
#[derive(Debug)]
pub struct RenderedDocument {
    pub html: String,
    pub temp: TempPath,
}
