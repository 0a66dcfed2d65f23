//! Child-process execution for external conversion tools.
//!
//! Tools run as async child processes, so waiting on them never ties up a runtime worker.
//! Every run is bounded by a timeout and observes the service's shutdown token; when either
//! fires, the child is killed (`kill_on_drop`) and the run reports [`Error::ToolTimeout`] or
//! [`Error::Cancelled`].

use std::ffi::OsString;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::errors::{Error, Result};

/// A fully specified tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    pub tool: &'static str,
    pub program: String,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

/// Captured output of a tool that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// First line the tool printed that starts with `Error:`, on either stream.
    ///
    /// LibreOffice exits 0 on e.g. an unknown export filter and only reports it this way.
    pub fn error_diagnostic(&self) -> Option<&str> {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|line| line.starts_with("Error:"))
    }
}

impl ToolCommand {
    pub fn new(tool: &'static str, program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            tool,
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Spawn the tool, wait for it, and check its exit status.
    ///
    /// A non-zero exit becomes [`Error::ToolFailed`] carrying the exit status and the tool's
    /// stderr. A tool that cannot be started at all becomes [`Error::ToolLaunch`].
    #[instrument(skip_all, fields(tool = self.tool, program = %self.program))]
    pub async fn run(self, cancel: &CancellationToken) -> Result<ToolOutput> {
        debug!(args = ?self.args, timeout = ?self.timeout, "Spawning conversion tool");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::ToolLaunch { tool: self.tool, source })?;

        let started = Instant::now();

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
                Ok(output) => output?,
                Err(_) => {
                    return Err(Error::ToolTimeout {
                        tool: self.tool,
                        timeout: self.timeout,
                    });
                }
            },
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let captured = ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        debug!(
            status = %output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Conversion tool exited"
        );

        if !output.status.success() {
            let stderr = captured.stderr.trim();
            let message = if stderr.is_empty() {
                output.status.to_string()
            } else {
                format!("{}: {}", output.status, stderr)
            };
            return Err(Error::ToolFailed { tool: self.tool, message });
        }

        Ok(captured)
    }
}
