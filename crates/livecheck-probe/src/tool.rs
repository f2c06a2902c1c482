//! Bounded invocation of external command-line tools (`ffprobe`, `ffmpeg`).
//!
//! Every invocation carries a timeout. The child is spawned with
//! `kill_on_drop`, so when the timeout elapses and the wait future is dropped
//! the process is killed rather than left running.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use crate::error::ToolError;

/// Stderr is truncated to this many bytes in error messages.
const STDERR_LIMIT: usize = 512;

/// Timeout for the `-version` availability check.
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs `program args...` and waits up to `timeout` for it to exit.
///
/// # Errors
///
/// - [`ToolError::NotFound`] if the program cannot be found.
/// - [`ToolError::Io`] for other spawn or pipe failures.
/// - [`ToolError::Timeout`] if the program does not exit in time.
/// - [`ToolError::NonZeroExit`] if it exits unsuccessfully.
pub async fn run_tool(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ToolError::Io {
            program: program.to_owned(),
            source,
        })?,
        Err(_) => {
            tracing::debug!(program, timeout_secs = timeout.as_secs(), "tool timed out");
            return Err(ToolError::Timeout {
                program: program.to_owned(),
                secs: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_owned(), |c| format!("status {c}"));
        return Err(ToolError::NonZeroExit {
            program: program.to_owned(),
            code,
            stderr: truncate_stderr(&output.stderr),
        });
    }

    Ok(ToolOutput {
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Confirms `program` can be launched by running `program -version`.
///
/// # Errors
///
/// Returns the [`ToolError`] from the version invocation.
pub async fn ensure_tool(program: &str) -> Result<(), ToolError> {
    run_tool(program, &["-version".to_owned()], VERSION_CHECK_TIMEOUT)
        .await
        .map(|_| ())
}

fn spawn_error(program: &str, err: std::io::Error) -> ToolError {
    if err.kind() == ErrorKind::NotFound {
        ToolError::NotFound {
            program: program.to_owned(),
        }
    } else {
        ToolError::Io {
            program: program.to_owned(),
            source: err,
        }
    }
}

fn truncate_stderr(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_LIMIT {
        return trimmed.to_owned();
    }
    let mut end = STDERR_LIMIT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}
