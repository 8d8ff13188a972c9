//! Subprocess plumbing around the external yt-dlp binary.
//!
//! Everything the service does with the tool goes through the narrow
//! [`Extractor`] trait: run it and capture stdout (the metadata probe), or
//! run it and hand back a live stdout reader (the streaming download). The
//! HTTP layer only ever sees this trait, so tests substitute a fake instead
//! of invoking a real binary.

use std::{
    io,
    path::PathBuf,
    pin::Pin,
    process::Stdio,
    task::{Context, Poll},
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf},
    process::{Child, ChildStdout, Command},
    time::timeout,
};
use tracing::{debug, error, warn};

use crate::config::Config;

pub const DEFAULT_TOOL: &str = "yt-dlp";

/// Failures of a tool invocation, mapped to responses by the HTTP layer.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("reading {tool} output: {source}")]
    Output {
        tool: String,
        #[source]
        source: io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("{tool} timed out after {seconds}s")]
    TimedOut { tool: String, seconds: u64 },
}

/// Live stdout of a streaming invocation, consumed as the response body.
pub type ToolStream = Box<dyn AsyncRead + Send + Unpin>;

/// The two ways this service runs the external tool.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Runs the tool, waits for it to exit, and returns its captured stdout.
    async fn capture_info(&self, url: &str) -> Result<Vec<u8>, ToolError>;

    /// Spawns the tool in streaming mode and returns its stdout as soon as
    /// the process is up. Stderr is drained into the diagnostic log in the
    /// background.
    async fn open_stream(&self, url: &str, itag: &str) -> Result<ToolStream, ToolError>;
}

/// Production [`Extractor`] that shells out to yt-dlp.
pub struct YtDlp {
    tool: String,
    cookies_file: Option<PathBuf>,
    user_agent: Option<String>,
    no_check_certificate: bool,
    info_timeout: Duration,
}

impl YtDlp {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tool: DEFAULT_TOOL.to_string(),
            cookies_file: config.cookies_file.clone(),
            user_agent: config.user_agent.clone(),
            no_check_certificate: config.no_check_certificate,
            info_timeout: config.info_timeout,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Arguments for the metadata probe: one JSON document on stdout.
    fn info_args(&self, url: &str) -> Vec<String> {
        let mut args = vec!["-J".to_string(), "--no-warnings".to_string()];
        self.push_common_flags(&mut args);
        args.push(url.to_string());
        args
    }

    /// Arguments for the streaming download: the selected format's raw
    /// bytes on stdout.
    fn stream_args(&self, url: &str, itag: &str) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            itag.to_string(),
            "-o".to_string(),
            "-".to_string(),
        ];
        self.push_common_flags(&mut args);
        args.push(url.to_string());
        args
    }

    fn push_common_flags(&self, args: &mut Vec<String>) {
        if let Some(path) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        if let Some(agent) = &self.user_agent {
            args.push("--user-agent".to_string());
            args.push(agent.clone());
        }
        if self.no_check_certificate {
            args.push("--no-check-certificates".to_string());
        }
    }

    /// Kill-on-drop means a client disconnect terminates the subprocess
    /// instead of leaking it; the runtime reaps the exit status in the
    /// background.
    fn command(&self, args: &[String]) -> Command {
        let mut command = Command::new(&self.tool);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn launch_error(&self, source: io::Error) -> ToolError {
        ToolError::Launch {
            tool: self.tool.clone(),
            source,
        }
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn capture_info(&self, url: &str) -> Result<Vec<u8>, ToolError> {
        let args = self.info_args(url);
        debug!(tool = %self.tool, %url, "probing formats");

        let child = self
            .command(&args)
            .spawn()
            .map_err(|source| self.launch_error(source))?;

        // On timeout the output future is dropped, which kills the child.
        let output = match timeout(self.info_timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| ToolError::Output {
                tool: self.tool.clone(),
                source,
            })?,
            Err(_) => {
                error!(tool = %self.tool, %url, "format probe timed out");
                return Err(ToolError::TimedOut {
                    tool: self.tool.clone(),
                    seconds: self.info_timeout.as_secs(),
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            error!(
                tool = %self.tool,
                status = %output.status,
                "format probe failed: {}",
                stderr.trim()
            );
            return Err(ToolError::Failed {
                tool: self.tool.clone(),
                status: output.status,
                stderr: stderr_tail(&stderr),
            });
        }

        if !stderr.trim().is_empty() {
            debug!(tool = %self.tool, "probe diagnostics: {}", stderr.trim());
        }

        Ok(output.stdout)
    }

    async fn open_stream(&self, url: &str, itag: &str) -> Result<ToolStream, ToolError> {
        let args = self.stream_args(url, itag);
        debug!(tool = %self.tool, %url, %itag, "starting streaming download");

        let mut child = self
            .command(&args)
            .spawn()
            .map_err(|source| self.launch_error(source))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.launch_error(io::Error::other("stdout pipe missing")))?;

        // Whatever the tool reports while streaming goes to the log; once
        // headers are out there is no channel back to the client anyway.
        if let Some(stderr) = child.stderr.take() {
            let tool = self.tool.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(tool = %tool, "{line}");
                }
            });
        }

        Ok(Box::new(StreamHandle {
            stdout,
            _child: child,
        }))
    }
}

/// Stdout reader that keeps the child alive alongside it. Dropping the
/// response body drops the handle, and kill-on-drop terminates the
/// subprocess mid-stream.
struct StreamHandle {
    stdout: ChildStdout,
    _child: Child,
}

impl AsyncRead for StreamHandle {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

/// Runs `<tool> --version` so a missing binary fails loudly at startup
/// instead of surfacing as a 500 on the first request.
pub async fn ensure_tool_available(tool: &str) -> anyhow::Result<()> {
    let status = Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => anyhow::bail!("{tool} is installed but returned {status}"),
        Err(err) => anyhow::bail!("{tool} is not installed or not in PATH: {err}"),
    }
}

/// The tool's stderr can run to pages of progress noise; the actual error
/// lands at the end.
fn stderr_tail(stderr: &str) -> String {
    const MAX_CHARS: usize = 500;
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= MAX_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - MAX_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn bare_config() -> Config {
        Config::from_lookup(|_| None).unwrap()
    }

    #[test]
    fn info_args_request_a_single_json_document() {
        let runner = YtDlp::from_config(&bare_config());
        assert_eq!(
            runner.info_args("https://example.com/watch?v=x"),
            ["-J", "--no-warnings", "https://example.com/watch?v=x"]
        );
    }

    #[test]
    fn stream_args_select_the_format_and_write_to_stdout() {
        let runner = YtDlp::from_config(&bare_config());
        assert_eq!(
            runner.stream_args("https://example.com/watch?v=x", "140"),
            ["-f", "140", "-o", "-", "https://example.com/watch?v=x"]
        );
    }

    #[test]
    fn configured_flags_are_appended_before_the_url() {
        let mut cookies = NamedTempFile::new().unwrap();
        writeln!(cookies, "# Netscape HTTP Cookie File").unwrap();
        let cookies_path = cookies.path().to_string_lossy().into_owned();

        let config = Config::from_lookup(|key| match key {
            "COOKIES_FILE" => Some(cookies_path.clone()),
            "USER_AGENT" => Some("Mozilla/5.0".to_string()),
            "NO_CHECK_CERTIFICATE" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();

        let runner = YtDlp::from_config(&config);
        let args = runner.info_args("url");
        assert_eq!(
            args,
            [
                "-J",
                "--no-warnings",
                "--cookies",
                cookies_path.as_str(),
                "--user-agent",
                "Mozilla/5.0",
                "--no-check-certificates",
                "url",
            ]
        );

        let stream = runner.stream_args("url", "22");
        assert_eq!(&stream[..4], ["-f", "22", "-o", "-"]);
        assert!(stream.contains(&"--no-check-certificates".to_string()));
        assert_eq!(stream.last().map(String::as_str), Some("url"));
    }

    #[test]
    fn unconfigured_flags_stay_absent() {
        let runner = YtDlp::from_config(&bare_config());
        let args = runner.stream_args("url", "140");
        assert!(!args.iter().any(|arg| arg == "--cookies"));
        assert!(!args.iter().any(|arg| arg == "--user-agent"));
        assert!(!args.iter().any(|arg| arg == "--no-check-certificates"));
    }

    #[test]
    fn stderr_tail_keeps_the_end_of_long_output() {
        let long = "x".repeat(1000) + " ERROR: fragment not found";
        let tail = stderr_tail(&long);
        assert!(tail.chars().count() <= 500);
        assert!(tail.ends_with("ERROR: fragment not found"));
    }
}
