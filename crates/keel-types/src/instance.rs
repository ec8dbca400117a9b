//! Container instance types
//!
//! Each environment has exactly one named container slot. A
//! `ContainerInstance` describes what should occupy it; an `InstanceHandle`
//! describes what was started; an `InstanceState` is what the runtime reports.

use crate::{ImageRef, InstanceName, RunMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Restart policy applied by the host's container runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    /// Always restart unless explicitly stopped
    #[default]
    UnlessStopped,
    OnFailure {
        max_retries: u32,
    },
}

impl RestartPolicy {
    /// Value for `docker run --restart`.
    pub fn as_docker_arg(&self) -> String {
        match self {
            RestartPolicy::No => "no".to_string(),
            RestartPolicy::Always => "always".to_string(),
            RestartPolicy::UnlessStopped => "unless-stopped".to_string(),
            RestartPolicy::OnFailure { max_retries } => format!("on-failure:{}", max_retries),
        }
    }
}

/// Bind mount for the service's persistent state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
}

impl VolumeMount {
    pub fn new(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
        }
    }

    /// Value for `docker run -v`.
    pub fn as_docker_arg(&self) -> String {
        format!("{}:{}", self.host_path, self.container_path)
    }
}

/// What should occupy the named container slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInstance {
    pub name: InstanceName,
    pub image: ImageRef,
    pub restart_policy: RestartPolicy,
    pub volume: VolumeMount,
    /// Remote path of the env file carrying the injected configuration
    pub env_file: String,
    /// Run mode written into that env file
    pub run_mode: RunMode,
}

/// Handle to a started instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHandle {
    pub name: InstanceName,
    pub container_id: String,
    pub image: ImageRef,
    pub run_mode: RunMode,
    pub started_at: DateTime<Utc>,
}

impl InstanceHandle {
    /// Short container id for display.
    pub fn short_id(&self) -> &str {
        let end = self.container_id.len().min(12);
        &self.container_id[..end]
    }
}

/// Lifecycle status reported by the container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStatus {
    Created,
    Running,
    Restarting,
    Paused,
    Exited { exit_code: i32 },
    Dead,
    Unknown(String),
}

impl ContainerStatus {
    /// Parse the runtime's `State.Status` string.
    pub fn from_runtime(status: &str, exit_code: i32) -> Self {
        match status {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "restarting" => ContainerStatus::Restarting,
            "paused" => ContainerStatus::Paused,
            "exited" => ContainerStatus::Exited { exit_code },
            "dead" => ContainerStatus::Dead,
            other => ContainerStatus::Unknown(other.to_string()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Restarting => write!(f, "restarting"),
            ContainerStatus::Paused => write!(f, "paused"),
            ContainerStatus::Exited { exit_code } => write!(f, "exited({})", exit_code),
            ContainerStatus::Dead => write!(f, "dead"),
            ContainerStatus::Unknown(s) => write!(f, "unknown({})", s),
        }
    }
}

/// Runtime view of a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    pub name: InstanceName,
    pub container_id: String,
    pub image: ImageRef,
    pub status: ContainerStatus,
    /// Restarts performed by the restart policy since creation
    pub restart_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Run mode read back from the container's environment, when known
    pub run_mode: Option<RunMode>,
}

impl InstanceState {
    /// Seconds since the current process started.
    pub fn uptime_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.started_at.map(|t| (now - t).num_seconds().max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_policy_args() {
        assert_eq!(RestartPolicy::default().as_docker_arg(), "unless-stopped");
        assert_eq!(
            RestartPolicy::OnFailure { max_retries: 5 }.as_docker_arg(),
            "on-failure:5"
        );
    }

    #[test]
    fn test_container_status_from_runtime() {
        assert!(ContainerStatus::from_runtime("running", 0).is_running());
        assert_eq!(
            ContainerStatus::from_runtime("exited", 137),
            ContainerStatus::Exited { exit_code: 137 }
        );
        assert_eq!(
            ContainerStatus::from_runtime("removing", 0),
            ContainerStatus::Unknown("removing".into())
        );
    }
}
