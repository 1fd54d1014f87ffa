//! Fleet tool invocation.
//!
//! The fleet tool is an opaque subprocess. Its stdout and stderr are
//! forwarded to the log line by line, except for `env` whose stdout is
//! captured for parsing.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cloudaln_core::NodeId;

/// Exit status and captured stdout of one fleet tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: i32,

    /// Raw stdout. The tool makes no promise about its encoding.
    pub stdout: Vec<u8>,
}

impl ToolOutput {
    /// Create an output from an exit code and raw stdout.
    pub fn new(code: i32, stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
        }
    }

    /// Stdout as text, or `None` if it is not valid UTF-8.
    pub fn stdout_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.stdout).ok()
    }
}

/// Operations the provisioner needs from the fleet tool.
///
/// `Err` means the tool could not be run at all; a tool that ran and failed
/// reports a non-zero code instead.
#[async_trait]
pub trait FleetTool: Send + Sync {
    /// Create `node` with the given driver arguments.
    async fn create(&self, node: &NodeId, driver_args: &[String]) -> io::Result<i32>;

    /// Describe `node`'s connection settings.
    async fn env(&self, node: &NodeId) -> io::Result<ToolOutput>;

    /// Remove `node`.
    async fn remove(&self, node: &NodeId) -> io::Result<i32>;
}

/// `docker-machine` driven as a subprocess.
#[derive(Debug, Clone)]
pub struct DockerMachine {
    /// Path to the executable.
    program: String,
}

impl DockerMachine {
    /// Create a driver for the executable at `program`.
    ///
    /// The path can be just "docker-machine" to use PATH lookup.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn exec(&self, node: &NodeId, args: Vec<String>, capture: bool) -> io::Result<ToolOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(node = %node, program = %self.program, args = ?args, "Spawning fleet tool");

        let mut child = cmd.spawn().map_err(|e| {
            error!(node = %node, program = %self.program, error = %e, "Failed to spawn fleet tool");
            e
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Failed to get stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Failed to get stderr"))?;

        let stderr_task = forward_lines(stderr, node.clone(), Stream::Stderr);

        let (captured, stdout_task) = if capture {
            let mut buf = Vec::new();
            let read = BufReader::new(stdout).read_to_end(&mut buf).await;
            (Some(read.map(|_| buf)), None)
        } else {
            (None, Some(forward_lines(stdout, node.clone(), Stream::Stdout)))
        };

        // Reap the child even when reading its output failed.
        let status = child.wait().await?;

        // Drain the forwarders so tool output is logged before the result.
        if let Some(task) = stdout_task {
            task.await.ok();
        }
        stderr_task.await.ok();

        let code = status.code().unwrap_or(-1);
        debug!(node = %node, exit_code = code, "Fleet tool exited");

        let stdout = match captured {
            Some(Ok(buf)) => buf,
            Some(Err(e)) => {
                error!(node = %node, error = %e, "Failed to read fleet tool output");
                return Err(e);
            }
            None => Vec::new(),
        };

        Ok(ToolOutput::new(code, stdout))
    }
}

impl Default for DockerMachine {
    fn default() -> Self {
        Self::new("docker-machine")
    }
}

#[async_trait]
impl FleetTool for DockerMachine {
    async fn create(&self, node: &NodeId, driver_args: &[String]) -> io::Result<i32> {
        let mut args = vec!["create".to_string()];
        args.extend_from_slice(driver_args);
        args.push(node.to_string());

        Ok(self.exec(node, args, false).await?.code)
    }

    async fn env(&self, node: &NodeId) -> io::Result<ToolOutput> {
        self.exec(node, vec!["env".to_string(), node.to_string()], true)
            .await
    }

    async fn remove(&self, node: &NodeId) -> io::Result<i32> {
        let args = vec!["rm".to_string(), "-y".to_string(), node.to_string()];
        Ok(self.exec(node, args, false).await?.code)
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward_lines<R>(reader: R, node: NodeId, stream: Stream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match stream {
                        Stream::Stdout => info!(node = %node, "{}", trimmed),
                        Stream::Stderr => warn!(node = %node, "{}", trimmed),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(node = %node, error = %e, "Error reading fleet tool output");
                    break;
                }
            }
        }
    })
}
