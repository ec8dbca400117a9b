//! Cross-check of the service's "started" notification

use crate::error::HealthResult;
use crate::logline::LogLine;
use async_trait::async_trait;
use keel_types::InstanceName;

/// Confirms that the notification channel received the "started" message
#[async_trait]
pub trait NotificationAudit: Send + Sync {
    /// Whether the current process run's start was acknowledged.
    ///
    /// `lines` are the log lines of the current run.
    async fn started_acknowledged(
        &self,
        instance: &InstanceName,
        lines: &[LogLine],
    ) -> HealthResult<bool>;

    /// Get the audit name
    fn name(&self) -> &str;
}

/// Trusts the service's own marker, printed after a successful send
pub struct LogMarkerAudit {
    marker: String,
}

impl LogMarkerAudit {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl NotificationAudit for LogMarkerAudit {
    async fn started_acknowledged(
        &self,
        _instance: &InstanceName,
        lines: &[LogLine],
    ) -> HealthResult<bool> {
        Ok(lines.iter().any(|l| l.contains(&self.marker)))
    }

    fn name(&self) -> &str {
        "log-marker"
    }
}
