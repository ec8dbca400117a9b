//! Transfer errors

use keel_remote::RemoteError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from packing and uploading a release
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("source tree not found: {0}")]
    SourceMissing(PathBuf),

    #[error("failed to pack source tree: {0}")]
    Pack(#[from] std::io::Error),

    #[error("walking source tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("upload failed: {0}")]
    Upload(#[source] RemoteError),

    #[error("extract failed: {0}")]
    Extract(#[source] RemoteError),

    #[error("activation failed: {0}")]
    Activate(#[source] RemoteError),

    #[error("writing env file failed: {0}")]
    Env(#[source] RemoteError),

    #[error("remote command failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("packing task failed: {0}")]
    Join(String),
}

/// Result type for transfer operations
pub type TransferResult<T> = Result<T, TransferError>;
