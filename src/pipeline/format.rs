//! Optional in-place formatting of the Markdown source.

use crate::config::ConversionConfig;
use crate::context::ConversionContext;
use crate::error::Md2HtmlError;
use crate::pipeline::tool::run_tool;
use std::ffi::OsString;
use tracing::info;

/// Run the configured formatter over `ctx.source`.
pub async fn run(ctx: &ConversionContext, config: &ConversionConfig) -> Result<(), Md2HtmlError> {
    let mut args: Vec<OsString> = config.formatter_args.iter().map(OsString::from).collect();
    args.push(ctx.source.as_os_str().to_owned());

    run_tool(
        "formatter",
        &config.formatter_program,
        args,
        config.tool_timeout_secs,
    )
    .await?;
    info!("Formatted {}", ctx.source.display());
    Ok(())
}
