//! TOC normalisation: give a bare table of contents a heading.
//!
//! Authors often paste a generated TOC (`- [Intro](#intro)` lines) without a
//! heading above it. The rendered document then shows an unlabelled list of
//! links. This stage inserts `## Table of Contents` (one level below the
//! document's leading heading) right before the first entry and writes the
//! source file back, so the fix is permanent and the next run is a no-op.

use crate::error::Md2HtmlError;
use crate::pipeline::markdown::{heading, prose_lines, ProseLine};
use crate::pipeline::metadata::read_source;
use crate::pipeline::persist::write_atomic;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info};

/// Heading text inserted above the TOC.
pub const TOC_TITLE: &str = "Table of Contents";

static RE_TOC_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*+]\s+\[[^\]]+\]\(#[^)\s]*\)").unwrap());

/// Return the source with a TOC heading inserted, or `None` if nothing needs
/// to change.
pub fn normalize(source: &str) -> Option<String> {
    let lines: Vec<ProseLine<'_>> = prose_lines(source).collect();
    let first_entry = lines.iter().position(|l| RE_TOC_ENTRY.is_match(l.text))?;
    let preceding = &lines[..first_entry];

    let titled = preceding
        .iter()
        .filter_map(|l| heading(l.text))
        .any(|(_, text)| text.eq_ignore_ascii_case(TOC_TITLE));
    if titled {
        return None;
    }

    let level = preceding
        .iter()
        .find_map(|l| heading(l.text))
        .map(|(lvl, _)| (lvl + 1).min(6))
        .unwrap_or(2);

    let newline = if source.contains("\r\n") { "\r\n" } else { "\n" };
    let at = lines[first_entry].offset;
    let before = &source[..at];
    let prev_blank = before.lines().last().map_or(true, |l| l.trim().is_empty());

    let mut out = String::with_capacity(source.len() + 32);
    out.push_str(before);
    if !prev_blank {
        out.push_str(newline);
    }
    out.push_str(&"#".repeat(level));
    out.push(' ');
    out.push_str(TOC_TITLE);
    out.push_str(newline);
    out.push_str(newline);
    out.push_str(&source[at..]);
    Some(out)
}

/// Normalise the TOC of the file at `path` in place.
///
/// Returns `true` when the file was rewritten.
pub async fn normalize_file(path: &Path) -> Result<bool, Md2HtmlError> {
    let source = read_source(path).await?;
    match normalize(&source) {
        Some(updated) => {
            write_atomic(path, updated)
                .await
                .map_err(|e| Md2HtmlError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            info!("Inserted '{}' heading into {}", TOC_TITLE, path.display());
            Ok(true)
        }
        None => {
            debug!("TOC already titled (or absent) in {}", path.display());
            Ok(false)
        }
    }
}
