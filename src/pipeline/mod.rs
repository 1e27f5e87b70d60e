//! Pipeline stages for Markdown-to-HTML publication.
//!
//! Each stage module implements one transformation; the helper modules
//! below them are shared building blocks.
//!
//! ## Data Flow
//!
//! ```text
//! paths ──▶ metadata ──▶ assets ──▶ toc ──▶ format ──▶ render ──▶ postprocess ──▶ pdf
//!           (title)     (styles/)  (source)  (tool)    (tool)     (html DOM)      (tool)
//! ```
//!
//! 1. [`paths`]       validate the source, derive output and asset locations
//! 2. [`metadata`]    title and description, with a fingerprint-keyed cache
//! 3. [`assets`]      ensure the stylesheet exists locally (fatal on failure)
//! 4. [`toc`]         insert a "Table of Contents" heading into the source
//! 5. [`format`]      optional external formatter, in place
//! 6. [`render`]      external renderer into a temp file
//! 7. [`postprocess`] localize images (concurrent fetches), then mutate the
//!    DOM and write the output atomically
//! 8. [`pdf`]         optional PDF beside the HTML
//!
//! Helpers: [`markdown`] (fence-aware line scanning), [`html`] (DOM
//! operations), [`persist`] (atomic writes), [`tool`] (external processes).

pub mod assets;
pub mod format;
pub mod html;
pub mod markdown;
pub mod metadata;
pub mod paths;
pub mod pdf;
pub mod persist;
pub mod postprocess;
pub mod render;
pub mod tool;
pub mod toc;
