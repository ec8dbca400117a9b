//! Health verification configuration

use keel_types::markers;
use serde::{Deserialize, Serialize};

/// Log markers printed by the supervised service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerSet {
    /// Ready to process events
    pub boot: String,
    /// Historical data loaded
    pub history: String,
    /// Periodic liveness
    pub heartbeat: String,
    /// "Started" notification delivered
    pub notify_ack: String,
    /// Decision point suppressed in simulation
    pub would_execute: String,
    /// Real side-effecting action
    pub live_execute: String,
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self {
            boot: markers::BOOT.to_string(),
            history: markers::HISTORY.to_string(),
            heartbeat: markers::HEARTBEAT.to_string(),
            notify_ack: markers::NOTIFY_ACK.to_string(),
            would_execute: markers::WOULD_EXECUTE.to_string(),
            live_execute: markers::LIVE_EXECUTE.to_string(),
        }
    }
}

/// Health verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Markers to look for
    pub markers: MarkerSet,

    /// Expected heartbeat interval (seconds)
    pub liveness_interval_secs: u64,

    /// Heartbeat may be this many intervals old before DEGRADED
    pub liveness_tolerance: f64,

    /// Window for counting restarts (seconds)
    pub crash_window_secs: u64,

    /// Restarts within the window that mean a crash-loop
    pub restart_threshold: u32,

    /// Time a fresh process gets to print its boot marker (seconds)
    pub boot_grace_secs: u64,

    /// Lines needed before the absence of a boot marker is meaningful
    pub min_lines: usize,

    /// Log lines fetched per check
    pub tail_lines: usize,

    /// Whether a missing "started" acknowledgment degrades the instance
    pub require_notify_ack: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            markers: MarkerSet::default(),
            liveness_interval_secs: 60,
            liveness_tolerance: 3.0,
            crash_window_secs: 600,
            restart_threshold: 3,
            boot_grace_secs: 120,
            min_lines: 3,
            tail_lines: 2_000,
            require_notify_ack: true,
        }
    }
}

impl HealthConfig {
    /// Oldest acceptable heartbeat age (seconds).
    pub fn max_heartbeat_age_secs(&self) -> i64 {
        (self.liveness_interval_secs as f64 * self.liveness_tolerance).ceil() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HealthConfig::default();
        assert_eq!(config.max_heartbeat_age_secs(), 180);
        assert_eq!(config.restart_threshold, 3);
    }

    #[test]
    fn test_partial_override() {
        let config: HealthConfig =
            serde_json::from_str(r#"{"liveness_interval_secs": 30, "markers": {"heartbeat": "[PING]"}}"#)
                .unwrap();
        assert_eq!(config.max_heartbeat_age_secs(), 90);
        assert_eq!(config.markers.heartbeat, "[PING]");
        assert_eq!(config.markers.boot, MarkerSet::default().boot);
    }
}
