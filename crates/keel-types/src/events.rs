//! Event types for Keel observability
//!
//! Events provide a unified stream of lifecycle activities across all steps.

use crate::{
    HealthStatus, ImageRef, InstanceName, PromotionStage, ReleaseId, RunMode, Step,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all Keel events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeelEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event source
    pub source: EventSource,

    /// Event severity
    pub severity: EventSeverity,

    /// Environment (host name) the event concerns
    pub environment: String,

    /// Actor who triggered the event
    pub actor: Option<String>,

    /// The actual event
    pub event: KeelEvent,
}

/// Event sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    Config,
    Host,
    Sync,
    Container,
    Health,
    Stage,
    Pipeline,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// Keel events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeelEvent {
    // ═══════════════════════════════════════════════════════════════════
    // HOST EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Host ensured (created or found)
    HostEnsured { host: String, created: bool },

    /// Static address attached to the host
    AddressAttached { host: String, address: String },

    /// Container runtime present on the host
    RuntimeBootstrapped { host: String, installed: bool },

    // ═══════════════════════════════════════════════════════════════════
    // SYNC EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Release uploaded and made live
    ReleaseActivated { release: ReleaseId, files: usize },

    /// Out-of-band configuration written to the host
    ConfigInjected { run_mode: RunMode },

    // ═══════════════════════════════════════════════════════════════════
    // CONTAINER EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Image built
    ImageBuilt { image: ImageRef },

    /// Instance started
    InstanceStarted {
        name: InstanceName,
        image: ImageRef,
        run_mode: RunMode,
    },

    /// Instance stopped
    InstanceStopped { name: InstanceName },

    /// Instance removed
    InstanceRemoved { name: InstanceName },

    // ═══════════════════════════════════════════════════════════════════
    // HEALTH EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Health check completed
    HealthChecked {
        name: InstanceName,
        status: HealthStatus,
    },

    // ═══════════════════════════════════════════════════════════════════
    // STAGE EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Stage changed
    StageChanged {
        from: PromotionStage,
        to: PromotionStage,
    },

    /// Promotion refused by policy
    PromotionBlocked { reason: String },

    /// Promotion allowed despite an advisory warning
    PromotionWarning { reason: String },

    // ═══════════════════════════════════════════════════════════════════
    // PIPELINE EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// A step failed fatally
    StepFailed { step: Step, message: String },
}

impl KeelEventEnvelope {
    /// Create a new event envelope
    pub fn new(event: KeelEvent, source: EventSource, environment: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            source,
            severity: Self::infer_severity(&event),
            environment: environment.into(),
            actor: None,
            event,
        }
    }

    /// Create with actor
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Infer severity from event type
    fn infer_severity(event: &KeelEvent) -> EventSeverity {
        match event {
            KeelEvent::StepFailed { .. } => EventSeverity::Error,

            KeelEvent::HealthChecked {
                status: HealthStatus::Failed,
                ..
            } => EventSeverity::Critical,

            KeelEvent::PromotionBlocked { .. }
            | KeelEvent::PromotionWarning { .. }
            | KeelEvent::InstanceStopped { .. }
            | KeelEvent::HealthChecked {
                status: HealthStatus::Degraded,
                ..
            } => EventSeverity::Warning,

            KeelEvent::StageChanged {
                to: PromotionStage::Live,
                ..
            } => EventSeverity::Warning,

            _ => EventSeverity::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_inference() {
        let failed = KeelEventEnvelope::new(
            KeelEvent::HealthChecked {
                name: InstanceName::new("bot"),
                status: HealthStatus::Failed,
            },
            EventSource::Health,
            "trading-bot",
        );
        assert_eq!(failed.severity, EventSeverity::Critical);

        let built = KeelEventEnvelope::new(
            KeelEvent::ImageBuilt {
                image: ImageRef::new("bot", "abc"),
            },
            EventSource::Container,
            "trading-bot",
        )
        .with_actor("ops");
        assert_eq!(built.severity, EventSeverity::Info);
        assert_eq!(built.actor.as_deref(), Some("ops"));
    }
}
