//! Provisioning errors

use keel_remote::RemoteError;
use keel_types::SpecValidationError;
use thiserror::Error;

/// Errors from host provisioning and bootstrap
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Resource quota exhausted; surfaced verbatim, never retried
    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Caller lacks permission; surfaced verbatim, never retried
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Resource already exists
    #[error("already exists: {0}")]
    Conflict(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Network or server-side hiccup talking to the provisioning API
    #[error("transient API error: {0}")]
    Transient(String),

    /// Any other API failure
    #[error("provisioning API error: {0}")]
    Api(String),

    /// Unparseable API response
    #[error("unexpected API response: {0}")]
    Parse(String),

    /// The host spec is invalid
    #[error("invalid host spec: {0}")]
    InvalidSpec(#[from] SpecValidationError),

    /// Remote channel failure during bootstrap
    #[error("remote command failed: {0}")]
    Remote(#[from] RemoteError),
}

impl ProvisioningError {
    /// Classify API error text into a provisioning error.
    pub fn classify(message: &str) -> Self {
        let text = message.trim().to_string();
        let lower = text.to_lowercase();

        if lower.contains("quota") || lower.contains("resource_exhausted") {
            ProvisioningError::Quota(text)
        } else if lower.contains("permission")
            || lower.contains("forbidden")
            || lower.contains("not authorized")
            || has_status_code(&lower, "403")
        {
            ProvisioningError::PermissionDenied(text)
        } else if lower.contains("already exists") || lower.contains("alreadyexists") {
            ProvisioningError::Conflict(text)
        } else if lower.contains("was not found")
            || lower.contains("notfound")
            || has_status_code(&lower, "404")
        {
            ProvisioningError::NotFound(text)
        } else if lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("connection reset")
            || lower.contains("connection refused")
            || lower.contains("temporarily unavailable")
            || lower.contains("try again")
            || ["500", "502", "503"]
                .iter()
                .any(|code| has_status_code(&lower, code))
        {
            ProvisioningError::Transient(text)
        } else {
            ProvisioningError::Api(text)
        }
    }

    /// Only transient failures are safe to retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProvisioningError::Transient(_) => true,
            ProvisioningError::Remote(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Words that put a following number in HTTP status position.
const STATUS_CONTEXT: &[&str] = &["http", "httperror", "code", "status", "error"];

/// `code` as a whole token right after an HTTP context word, so sizes and
/// limits like `500GB` or `Limit: 500` never match.
fn has_status_code(lower: &str, code: &str) -> bool {
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    tokens
        .windows(2)
        .any(|pair| pair[1] == code && STATUS_CONTEXT.contains(&pair[0]))
}

/// Result type for provisioning operations
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;
