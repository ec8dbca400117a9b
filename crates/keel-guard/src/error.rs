//! Error types for the service guard

use keel_config::ConfigError;
use thiserror::Error;

/// Guard errors
#[derive(Debug, Error)]
pub enum GuardError {
    /// Configuration invalid at boot
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Notification channel rejected a message
    #[error("notification failed: {0}")]
    Notify(String),

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Order placement failed
    #[error("order placement failed: {0}")]
    Order(String),
}

/// Result type for guard operations
pub type GuardResult<T> = Result<T, GuardError>;
