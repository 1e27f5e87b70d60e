//! PDF rendering of the final HTML (wkhtmltopdf by default).
//!
//! The footer carries the copyright line, the document date and page
//! numbers. `[page]` and `[topage]` are substituted by the renderer.

use crate::config::ConversionConfig;
use crate::error::Md2HtmlError;
use crate::pipeline::tool::run_tool;
use chrono::{Datelike, Local, NaiveDate};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

/// Accepted input format for the footer date.
pub const DATE_INPUT_FORMAT: &str = "%Y-%m-%d";

/// How the footer date is printed, e.g. `05 March 2024`.
pub const DATE_DISPLAY_FORMAT: &str = "%d %B %Y";

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(input: &str) -> Result<NaiveDate, Md2HtmlError> {
    NaiveDate::parse_from_str(input.trim(), DATE_INPUT_FORMAT).map_err(|e| {
        Md2HtmlError::InvalidConfig(format!("date {input:?} is not YYYY-MM-DD: {e}"))
    })
}

/// The configured date, or today.
pub fn document_date(configured: Option<&str>) -> Result<NaiveDate, Md2HtmlError> {
    match configured {
        Some(s) => parse_date(s),
        None => Ok(Local::now().date_naive()),
    }
}

/// Footer text: (left, center, right).
pub fn footer(date: NaiveDate, holder: &str) -> (String, String, String) {
    (
        format!(
            "Copyright \u{a9} {} {}. All Rights Reserved.",
            holder,
            date.year()
        ),
        date.format(DATE_DISPLAY_FORMAT).to_string(),
        "Page [page] of [topage]".to_string(),
    )
}

pub fn pdf_path_for(html: &Path) -> PathBuf {
    html.with_extension("pdf")
}

/// Render `html` into the sibling `.pdf` file and return its path.
pub async fn run(html: &Path, config: &ConversionConfig) -> Result<PathBuf, Md2HtmlError> {
    let date = document_date(config.pdf_date.as_deref())?;
    let (left, center, right) = footer(date, &config.copyright_holder);
    let out = pdf_path_for(html);

    let args: Vec<OsString> = vec![
        "--quiet".into(),
        "--enable-local-file-access".into(),
        "--footer-font-size".into(),
        "8".into(),
        "--footer-left".into(),
        left.into(),
        "--footer-center".into(),
        center.into(),
        "--footer-right".into(),
        right.into(),
        html.as_os_str().to_owned(),
        out.as_os_str().to_owned(),
    ];
    run_tool("pdf renderer", &config.pdf_program, args, config.tool_timeout_secs).await?;

    info!("Wrote {}", out.display());
    Ok(out)
}
