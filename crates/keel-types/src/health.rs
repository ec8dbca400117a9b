//! Health classification shared between the verifier and the controller

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a running instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    /// Booted, history loaded, heartbeat fresh, start acknowledged
    Healthy,
    /// Running but a periodic marker or acknowledgment is missing
    Degraded,
    /// Crash-loop or terminal exit
    Failed,
    /// Not enough log history to decide
    Unknown,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Whether polling can stop on this status.
    pub fn is_settled(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Failed)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Failed => write!(f, "FAILED"),
            HealthStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}
