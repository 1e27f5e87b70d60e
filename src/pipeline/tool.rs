//! External program invocation shared by the render, format and PDF stages.
//!
//! The child is spawned with `kill_on_drop(true)` and awaited under a
//! timeout, so neither a hung tool nor a cancelled conversion leaves a
//! process behind.

use crate::error::Md2HtmlError;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run `program args…` and wait at most `timeout_secs` for it to exit.
///
/// `tool` names the role (`"renderer"`, `"formatter"`, …) in errors.
pub async fn run_tool<I, S>(
    tool: &'static str,
    program: &str,
    args: I,
    timeout_secs: u64,
) -> Result<ToolOutput, Md2HtmlError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!("Running {}: {:?}", tool, cmd.as_std());

    let child = cmd.spawn().map_err(|e| Md2HtmlError::ToolNotFound {
        tool,
        program: program.to_string(),
        detail: e.to_string(),
    })?;

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
        .await
        .map_err(|_| Md2HtmlError::ToolTimeout {
            tool,
            secs: timeout_secs,
        })?
        .map_err(|e| Md2HtmlError::ToolFailed {
            tool,
            status: "an I/O error".to_string(),
            stderr: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(Md2HtmlError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", tool, stderr.trim());
    }
    Ok(ToolOutput { stdout, stderr })
}
