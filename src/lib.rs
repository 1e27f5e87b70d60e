//! # md2html-publish
//!
//! Publish Markdown documents as styled, self-contained HTML (and optionally
//! PDF).
//!
//! ## Why this crate?
//!
//! A Markdown renderer gives you HTML, but not a publishable artifact: images
//! still point at remote hosts, the stylesheet is whatever the renderer
//! inlined, bare URLs are dead text and the page carries no metadata. This
//! crate wraps the renderer with a deterministic post-processing pipeline
//! that localizes assets (with caching and bounded concurrency), links the
//! managed stylesheet, inserts the logo and meta tags, and repairs the few
//! attributes static publishing needs. Running it twice yields the same
//! bytes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Metadata    title + description from the source (cached)
//!  ├─ 2. Stylesheet  ensure styles/<name>.css exists (fatal if not)
//!  ├─ 3. TOC         give a bare table of contents its heading
//!  ├─ 4. Format      optional external formatter
//!  ├─ 5. Render      external renderer → standalone HTML
//!  ├─ 6. Post-proc.  meta, images, links, logo, stylesheet, repair
//!  └─ 7. PDF         optional HTML → PDF with footer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use md2html_publish::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .max_concurrent_downloads(4)
//!         .build()?;
//!     let output = convert("spec.md", &config).await?;
//!     println!("{:?}", output.html_path);
//!     if let Some(report) = &output.report {
//!         eprintln!("images: {} localized / {} dropped",
//!             report.images_localized,
//!             report.images_dropped.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2html` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! md2html-publish = { version = "0.1", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Role | Default | Needed when |
//! |------|---------|-------------|
//! | Renderer  | `pandoc`      | `render_html` (default on) |
//! | Formatter | `prettier`    | `format_source` |
//! | PDF       | `wkhtmltopdf` | `render_pdf` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConfigOverrides, ConversionConfig, ConversionConfigBuilder};
pub use context::{ConversionContext, SENTINEL};
pub use convert::{convert, convert_sync, convert_to_file, Converter};
pub use error::{AssetError, Md2HtmlError, Stage};
pub use output::{
    ConversionOutput, ConversionStats, DocumentMetadata, DroppedImage, PostProcessReport,
};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
