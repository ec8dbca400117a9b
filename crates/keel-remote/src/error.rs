//! Remote channel errors

use thiserror::Error;

/// Errors from the remote-execution channel
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The local client program could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The remote command exited non-zero
    #[error("command `{command}` failed with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The command did not finish in time
    #[error("command `{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// The host has no address to connect to
    #[error("host {0} has no external address")]
    NoAddress(String),

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Standard error text of a failed command, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            RemoteError::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Connection-level failures worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Timeout { .. } => true,
            // ssh exits 255 on connection errors
            RemoteError::CommandFailed {
                status: Some(255), ..
            } => true,
            _ => false,
        }
    }
}

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;
