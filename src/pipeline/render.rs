//! Markdown rendering through the external renderer (pandoc by default).
//!
//! The renderer writes a standalone HTML5 page to a temp file beside the
//! final output. The temp file is owned by the returned
//! [`RenderedDocument`], so it disappears when post-processing finishes or
//! when the conversion fails before then.

use crate::config::ConversionConfig;
use crate::context::{ConversionContext, RenderedDocument};
use crate::error::Md2HtmlError;
use crate::pipeline::tool::run_tool;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Input format handed to the renderer.
pub const MARKDOWN_FORMAT: &str =
    "markdown+autolink_bare_uris+hard_line_breaks+smart+pipe_tables+yaml_metadata_block";

/// Code block highlighting theme.
pub const HIGHLIGHT_STYLE: &str = "tango";

/// Arguments for rendering `source` into `out`.
pub fn renderer_args(
    source: &Path,
    out: &Path,
    stylesheet_href: &str,
    title: &str,
    toc_depth: u8,
) -> Vec<OsString> {
    vec![
        source.as_os_str().to_owned(),
        "-f".into(),
        MARKDOWN_FORMAT.into(),
        "-t".into(),
        "html5".into(),
        "-s".into(),
        "-c".into(),
        stylesheet_href.into(),
        "--metadata".into(),
        format!("title={title}").into(),
        "--toc".into(),
        format!("--toc-depth={toc_depth}").into(),
        format!("--highlight-style={HIGHLIGHT_STYLE}").into(),
        "--mathjax".into(),
        "-o".into(),
        out.as_os_str().to_owned(),
    ]
}

/// Render `ctx.source` and store the HTML in `ctx.document`.
pub async fn run(ctx: &mut ConversionContext, config: &ConversionConfig) -> Result<(), Md2HtmlError> {
    let href = ctx
        .stylesheet_href
        .clone()
        .ok_or_else(|| Md2HtmlError::Internal("stylesheet was not ensured".into()))?;
    let dir = ctx.output_dir();
    let write_err = |e: io::Error| Md2HtmlError::OutputWriteFailed {
        path: dir.clone(),
        source: e,
    };

    tokio::fs::create_dir_all(&dir).await.map_err(write_err)?;
    let temp = tempfile::Builder::new()
        .prefix(".md2html-")
        .suffix(".html")
        .tempfile_in(&dir)
        .map_err(write_err)?
        .into_temp_path();

    let args = renderer_args(&ctx.source, &temp, &href, &ctx.title, config.toc_depth);
    run_tool(
        "renderer",
        &config.renderer_program,
        args,
        config.tool_timeout_secs,
    )
    .await?;

    let html = match tokio::fs::read_to_string(&temp).await {
        Ok(html) if !html.trim().is_empty() => html,
        Ok(_) => {
            return Err(Md2HtmlError::RenderOutputMissing {
                path: temp.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Md2HtmlError::RenderOutputMissing {
                path: temp.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(Md2HtmlError::SourceRead {
                path: temp.to_path_buf(),
                source: e,
            })
        }
    };

    debug!("Renderer output: {} bytes at {}", html.len(), temp.display());
    info!("Rendered {}", ctx.source.display());
    ctx.document = Some(RenderedDocument { html, temp });
    Ok(())
}
