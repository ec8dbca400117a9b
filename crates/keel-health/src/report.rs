//! Health report

use chrono::{DateTime, Utc};
use keel_types::{ContainerStatus, HealthStatus, InstanceName, RunMode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub instance: InstanceName,
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,

    /// Runtime status, `None` if the container does not exist
    pub container: Option<ContainerStatus>,
    /// Run mode the container was started with, if known
    #[serde(default)]
    pub run_mode: Option<RunMode>,
    pub restart_count: u32,
    pub restarts_in_window: u32,
    pub uptime_secs: Option<i64>,

    pub booted: bool,
    pub history_loaded: bool,
    pub notification_acked: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub heartbeat_age_secs: Option<i64>,

    /// Decision points logged but suppressed
    pub would_execute: usize,
    /// Real side-effecting actions
    pub live_executions: usize,

    /// Log lines considered
    pub log_lines: usize,

    /// Human-readable reasons behind the classification
    pub findings: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    pub fn has_heartbeat(&self) -> bool {
        self.last_heartbeat.is_some()
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.instance, self.status)?;
        if let Some(age) = self.heartbeat_age_secs {
            write!(f, " (heartbeat {}s ago)", age)?;
        }
        if !self.findings.is_empty() {
            write!(f, ": {}", self.findings.join("; "))?;
        }
        Ok(())
    }
}
