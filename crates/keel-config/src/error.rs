//! Configuration error types

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Everything wrong with a configuration source, collected in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigIssues {
    /// Required keys that are absent or empty
    pub missing: Vec<String>,
    /// Keys whose value could not be parsed, with the reason
    pub invalid: Vec<(String, String)>,
}

impl ConfigIssues {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

impl fmt::Display for ConfigIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing required keys: {}", self.missing.join(", ")));
        }
        for (key, reason) in &self.invalid {
            parts.push(format!("invalid {}: {}", key, reason));
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required keys missing or values invalid
    #[error("configuration error: {0}")]
    Invalid(ConfigIssues),

    /// Env file could not be read
    #[error("cannot read env file {path}: {source}")]
    EnvFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Env file has a line that is not `KEY=VALUE`
    #[error("malformed env file {path} at line {line}: {reason}")]
    EnvFileSyntax {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
