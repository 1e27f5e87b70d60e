//! Path resolution: validate the source and derive every other path from it.
//!
//! All later stages work exclusively with the paths produced here. The source
//! is canonicalised so that the metadata cache sees one key per file no matter
//! how the caller spelled the path; the output path is made absolute but not
//! canonicalised because it usually does not exist yet.

use crate::config::ConversionConfig;
use crate::error::Md2HtmlError;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Every file-system location one conversion touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub source: PathBuf,
    pub output: PathBuf,
    pub repo_root: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub images_dir: PathBuf,
    pub styles_dir: PathBuf,
}

/// Validate `source` and derive the output and asset locations.
///
/// When `output` is `None` the HTML lands beside the source with an `.html`
/// extension.
pub fn resolve(
    source: &Path,
    output: Option<&Path>,
    config: &ConversionConfig,
) -> Result<ResolvedPaths, Md2HtmlError> {
    let source = resolve_source(source)?;

    let output = match output {
        Some(p) => absolutize(p)?,
        None => source.with_extension("html"),
    };
    if output.file_name().is_none() {
        return Err(Md2HtmlError::InvalidPath {
            path: output,
            reason: "output must name a file".into(),
        });
    }
    if output.is_dir() {
        return Err(Md2HtmlError::InvalidPath {
            path: output,
            reason: "output is a directory".into(),
        });
    }
    if output == source {
        return Err(Md2HtmlError::InvalidPath {
            path: output,
            reason: "output would overwrite the Markdown source".into(),
        });
    }

    let output_dir = output
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let source_dir = source.parent().map(Path::to_path_buf);
    let repo_root = source_dir.as_deref().and_then(find_repo_root);

    let resolved = ResolvedPaths {
        images_dir: output_dir.join(&config.images_subdir),
        styles_dir: output_dir.join(&config.styles_subdir),
        source,
        output,
        repo_root,
        source_dir,
    };
    debug!("Resolved paths: {:?}", resolved);
    Ok(resolved)
}

/// Check the source exists, is a regular file and is readable.
fn resolve_source(path: &Path) -> Result<PathBuf, Md2HtmlError> {
    if !path.exists() {
        return Err(Md2HtmlError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(Md2HtmlError::InvalidPath {
            path: path.to_path_buf(),
            reason: "source is not a regular file".into(),
        });
    }

    // Check read permission by attempting to open
    match std::fs::File::open(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Md2HtmlError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(Md2HtmlError::SourceRead {
                path: path.to_path_buf(),
                source: e,
            });
        }
    }

    std::fs::canonicalize(path).map_err(|e| Md2HtmlError::SourceRead {
        path: path.to_path_buf(),
        source: e,
    })
}

fn absolutize(path: &Path) -> Result<PathBuf, Md2HtmlError> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir().map_err(|e| Md2HtmlError::InvalidPath {
        path: path.to_path_buf(),
        reason: format!("cannot determine working directory: {e}"),
    })?;
    Ok(normalize(&cwd.join(path)))
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            c => out.push(c),
        }
    }
    out
}

/// Walk up from `start` to the nearest directory containing `.git`.
pub fn find_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Path of `target` relative to `base_dir`, with `/` separators, for use in
/// HTML attributes.
///
/// Falls back to the full target path when `target` is not under `base_dir`.
pub fn relative_href(base_dir: &Path, target: &Path) -> String {
    let rel = target.strip_prefix(base_dir).unwrap_or(target);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
