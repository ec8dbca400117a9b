//! Health verification errors

use keel_container::ContainerError;
use thiserror::Error;

/// Errors from health verification
#[derive(Debug, Error)]
pub enum HealthError {
    /// Reading container state or logs failed
    #[error("container query failed: {0}")]
    Container(#[from] ContainerError),

    /// Notification audit failed
    #[error("notification audit failed: {0}")]
    Audit(String),
}

/// Result type for health operations
pub type HealthResult<T> = Result<T, HealthError>;
