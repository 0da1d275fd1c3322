//! Runs package-manager binaries and captures their output.
//!
//! Two bounds apply to every run: each line read waits at most the read
//! timeout, and the whole process (reading plus exit) at most the process
//! timeout. Reads are cancellable futures, so a timed-out read leaves
//! nothing running; the child is killed and reaped before [`ToolRunner::run`]
//! returns.
//!
//! A failed run is a value, not an error. Callers fall back to parsing
//! files when `succeeded` is false.

use crate::config::Config;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub lines: Vec<String>,
    pub succeeded: bool,
}

impl ToolOutput {
    fn failed(lines: Vec<String>) -> Self {
        Self {
            lines,
            succeeded: false,
        }
    }

    /// Lines joined back into one document (for JSON-emitting tools).
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct ToolRunner {
    read_timeout: Duration,
    process_timeout: Duration,
}

impl ToolRunner {
    pub fn new(read_timeout: Duration, process_timeout: Duration) -> Self {
        Self {
            read_timeout,
            process_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.read_timeout(), config.process_timeout())
    }

    /// Runs `argv` in `working_dir` with stderr discarded.
    pub async fn run(&self, working_dir: &Path, argv: &[String]) -> ToolOutput {
        let Some((program, args)) = argv.split_first() else {
            return ToolOutput::failed(Vec::new());
        };

        let spawned = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                info!(tool = %program, dir = %working_dir.display(), error = %e, "tool not available");
                return ToolOutput::failed(Vec::new());
            }
        };

        let deadline = Instant::now() + self.process_timeout;
        let (lines, mut succeeded) = self.read_lines(&mut child, program, deadline).await;

        if !succeeded {
            // Stop a stalled tool so the wait below returns promptly.
            let _ = child.start_kill();
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, child.wait()).await {
            Ok(Ok(status)) => {
                if !status.success() {
                    debug!(tool = %program, status = %status, "tool exited unsuccessfully");
                    succeeded = false;
                }
            }
            Ok(Err(e)) => {
                warn!(tool = %program, error = %e, "failed waiting for tool");
                succeeded = false;
            }
            Err(_) => {
                warn!(tool = %program, timeout = ?self.process_timeout, "tool exceeded process timeout");
                let _ = child.kill().await;
                succeeded = false;
            }
        }

        ToolOutput { lines, succeeded }
    }

    async fn read_lines(&self, child: &mut Child, program: &str, deadline: Instant) -> (Vec<String>, bool) {
        let Some(stdout) = child.stdout.take() else {
            return (Vec::new(), false);
        };

        let mut reader = BufReader::new(stdout);
        let mut lines = Vec::new();
        let mut buf = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(tool = %program, "tool exceeded process timeout while reading");
                return (lines, false);
            }

            buf.clear();
            match timeout(self.read_timeout.min(remaining), reader.read_until(b'\n', &mut buf)).await {
                Ok(Ok(0)) => return (lines, true),
                Ok(Ok(_)) => {
                    let line = String::from_utf8_lossy(&buf);
                    lines.push(line.trim_end_matches(['\n', '\r']).to_string());
                }
                Ok(Err(e)) => {
                    warn!(tool = %program, error = %e, "failed reading tool output");
                    return (lines, false);
                }
                Err(_) => {
                    warn!(tool = %program, timeout = ?self.read_timeout, "no output from tool within read timeout");
                    return (lines, false);
                }
            }
        }
    }
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(15 * 60))
    }
}

/// Builds an argv vector from string slices.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
