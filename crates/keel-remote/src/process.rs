//! Local process execution shared by all shell implementations

use crate::error::{RemoteError, RemoteResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status (`None` if killed by a signal)
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given status and stderr.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Turn a non-zero exit into [`RemoteError::CommandFailed`].
    pub fn check(self, command: &str) -> RemoteResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(RemoteError::CommandFailed {
                command: command.to_string(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Run a prepared command to completion, optionally feeding stdin.
pub async fn run(
    mut cmd: Command,
    label: &str,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> RemoteResult<CommandOutput> {
    let program = cmd.as_std().get_program().to_string_lossy().to_string();

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .kill_on_drop(true);

    debug!(program = %program, command = %label, "Running command");

    let mut child = cmd.spawn().map_err(|source| RemoteError::Spawn {
        program: program.clone(),
        source,
    })?;

    if let Some(bytes) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(bytes).await?;
            pipe.shutdown().await?;
        }
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(RemoteError::Timeout {
                command: label.to_string(),
                secs: timeout.as_secs(),
            })
        }
    };

    Ok(CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
