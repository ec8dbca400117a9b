//! Container errors

use keel_remote::RemoteError;
use thiserror::Error;

/// Errors from container lifecycle operations
#[derive(Debug, Error)]
pub enum ContainerError {
    /// A required manifest is absent from the build context
    #[error("build context {context} is missing {file}")]
    MissingManifest { context: String, file: String },

    /// The image build failed
    #[error("build of {image} failed: {message}")]
    Build { image: String, message: String },

    /// An instance with this name already exists
    #[error("an instance named {name} already exists ({container_id}); use replace")]
    NameConflict { name: String, container_id: String },

    /// No instance with this name
    #[error("no instance named {0}")]
    NotFound(String),

    /// Runtime command failed
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// Unparseable runtime output
    #[error("unexpected runtime output: {0}")]
    Parse(String),

    /// Remote channel failure
    #[error("remote command failed: {0}")]
    Remote(#[from] RemoteError),
}

impl ContainerError {
    /// Failures that abort a deployment before any running instance is touched.
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            ContainerError::MissingManifest { .. } | ContainerError::Build { .. }
        )
    }
}

/// Result type for container operations
pub type ContainerResult<T> = Result<T, ContainerError>;
