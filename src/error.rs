//! Error types for the md2html-publish library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2HtmlError`] is **fatal**: the conversion cannot proceed at all
//!   (missing source, stylesheet unavailable, renderer crashed, output not
//!   writable). Returned as `Err(Md2HtmlError)` from the top-level `convert*`
//!   functions, wrapped in [`Md2HtmlError::Stage`] once a stage has started.
//!
//! * [`AssetError`] is **non-fatal** for content images: a single image could
//!   not be fetched, so it is dropped from the document and recorded in the
//!   [`crate::output::PostProcessReport`]. The same error is fatal when it
//!   concerns the managed stylesheet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A named, ordered pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Metadata,
    Stylesheet,
    Toc,
    Format,
    Render,
    PostProcess,
    Pdf,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Metadata => "metadata",
            Stage::Stylesheet => "stylesheet",
            Stage::Toc => "toc",
            Stage::Format => "format",
            Stage::Render => "render",
            Stage::PostProcess => "post-process",
            Stage::Pdf => "pdf",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All fatal errors returned by the md2html-publish library.
///
/// Per-image failures use [`AssetError`] and are stored in the
/// post-processing report rather than propagated here.
#[derive(Debug, Error)]
pub enum Md2HtmlError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("Markdown source not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the source.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The source exists but could not be read (directory, invalid UTF-8, …).
    #[error("Failed to read '{path}': {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A path could not be used for the requested role.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    // ── Asset errors ──────────────────────────────────────────────────────
    /// The managed stylesheet is neither cached locally nor fetchable.
    #[error("Stylesheet unavailable: {0}\nNo valid document can be produced without it.")]
    StylesheetUnavailable(#[source] AssetError),

    // ── External tool errors ──────────────────────────────────────────────
    /// The external program could not be started.
    #[error("Failed to start {tool} ('{program}'): {detail}\nIs it installed and on PATH?")]
    ToolNotFound {
        tool: &'static str,
        program: String,
        detail: String,
    },

    /// The external program exited unsuccessfully.
    #[error("{tool} exited with {status}:\n{stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    /// The external program did not finish in time and was killed.
    #[error("{tool} timed out after {secs}s")]
    ToolTimeout { tool: &'static str, secs: u64 },

    /// The renderer exited cleanly but produced no HTML.
    #[error("Renderer produced no output at '{path}'")]
    RenderOutputMissing { path: PathBuf },

    // ── Document errors ───────────────────────────────────────────────────
    /// The rendered HTML lacks a structural element post-processing needs.
    #[error("Rendered HTML has no <{element}> element")]
    MalformedDocument { element: &'static str },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file (HTML, PDF, directories).
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Orchestration ─────────────────────────────────────────────────────
    /// A stage failed; the pipeline was aborted.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Md2HtmlError>,
    },

    /// The caller-level conversion timeout elapsed.
    #[error("Conversion timed out after {secs}s")]
    ConversionTimedOut { secs: u64 },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Md2HtmlError {
    /// Attribute this error to `stage`. Already-attributed errors are kept as-is.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            e @ Md2HtmlError::Stage { .. } => e,
            e => Md2HtmlError::Stage {
                stage,
                source: Box::new(e),
            },
        }
    }

    /// The stage that failed, if the error came from inside the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Md2HtmlError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error, unwrapping the stage attribution.
    pub fn cause(&self) -> &Md2HtmlError {
        match self {
            Md2HtmlError::Stage { source, .. } => source.cause(),
            e => e,
        }
    }
}

/// A non-fatal error for a single remote asset.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetError {
    /// The URL could not be parsed.
    #[error("invalid asset URL '{url}'")]
    InvalidUrl { url: String },

    /// The server answered with a non-success status.
    #[error("GET {url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    /// The fetch did not complete within the configured bound.
    #[error("GET {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// Connection, TLS or body transfer failure.
    #[error("GET {url} failed: {detail}")]
    Request { url: String, detail: String },

    /// The bytes could not be persisted.
    #[error("failed to store '{path}': {detail}")]
    Io { path: PathBuf, detail: String },
}

impl AssetError {
    pub fn url(&self) -> Option<&str> {
        match self {
            AssetError::InvalidUrl { url }
            | AssetError::Http { url, .. }
            | AssetError::Timeout { url, .. }
            | AssetError::Request { url, .. } => Some(url),
            AssetError::Io { .. } => None,
        }
    }
}
