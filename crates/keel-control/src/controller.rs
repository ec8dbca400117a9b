//! Stage Controller - SIMULATION, LIVE and MONITORING
//!
//! Every transition has an explicit trigger:
//!
//! - `promote`: operator, SIMULATION to LIVE
//! - `observe`: first healthy heartbeat in LIVE moves to MONITORING
//! - `rollback`: operator, any stage back to SIMULATION
//!
//! Nothing in this module moves toward a riskier stage on its own.

use crate::error::{ControlError, ControlResult};
use crate::policy::{OperatorConfirmation, PromotionGate, PromotionPolicy};
use crate::record::StageRecord;
use crate::store::StageStore;
use chrono::Utc;
use keel_container::ContainerLifecycleManager;
use keel_health::{HealthReport, HealthVerifier};
use keel_types::{
    ContainerStatus, DeploymentConfig, EventSource, InstanceHandle, KeelEvent, KeelEventEnvelope,
    PromotionStage, RollbackMode, RunMode, StageTransition, TransitionTrigger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Actor recorded for transitions the controller derives itself
const SYSTEM_ACTOR: &str = "keel";

/// Drives the promotion stages of one deployment
pub struct StageController {
    store: Arc<dyn StageStore>,
    lifecycle: Arc<ContainerLifecycleManager>,
    verifier: Arc<HealthVerifier>,
    policy: PromotionPolicy,
    environment: String,
    event_tx: broadcast::Sender<KeelEventEnvelope>,
}

impl StageController {
    pub fn new(
        store: Arc<dyn StageStore>,
        lifecycle: Arc<ContainerLifecycleManager>,
        verifier: Arc<HealthVerifier>,
        policy: PromotionPolicy,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let environment = lifecycle.instance_name().to_string();
        Self {
            store,
            lifecycle,
            verifier,
            policy,
            environment,
            event_tx,
        }
    }

    /// Name the environment in emitted events.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Share an existing event channel.
    pub fn with_events(mut self, event_tx: broadcast::Sender<KeelEventEnvelope>) -> Self {
        self.event_tx = event_tx;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeelEventEnvelope> {
        self.event_tx.subscribe()
    }

    pub fn policy(&self) -> &PromotionPolicy {
        &self.policy
    }

    /// Stored record, or a fresh SIMULATION record.
    pub async fn record(&self) -> ControlResult<StageRecord> {
        Ok(self
            .store
            .load()
            .await?
            .unwrap_or_else(|| StageRecord::new(Utc::now())))
    }

    pub async fn stage(&self) -> ControlResult<PromotionStage> {
        Ok(self.record().await?.stage)
    }

    /// SIMULATION to LIVE: replace the instance with the operator's live
    /// configuration.
    ///
    /// The configuration is used as loaded and must already say
    /// `DRY_RUN=false`. The running image is kept.
    /// With an advisory gate unmet preconditions are logged and promotion
    /// proceeds; `RequireHealthy` refuses instead.
    #[instrument(skip(self, config, confirmation), fields(actor = %confirmation.actor))]
    pub async fn promote(
        &self,
        config: &DeploymentConfig,
        confirmation: &OperatorConfirmation,
    ) -> ControlResult<InstanceHandle> {
        let mut record = self.record().await?;
        if record.stage != PromotionStage::Simulation {
            return Err(ControlError::InvalidTransition {
                from: record.stage,
                action: "promote",
            });
        }
        if !confirmation.acknowledged_signals {
            self.emit(KeelEvent::PromotionBlocked {
                reason: "signal comparison not acknowledged".to_string(),
            });
            return Err(ControlError::ConfirmationRequired);
        }
        if config.run_mode != RunMode::Live {
            let reason = "DRY_RUN is still true".to_string();
            warn!(reason = %reason, "Promotion blocked by configuration");
            self.emit(KeelEvent::PromotionBlocked {
                reason: reason.clone(),
            });
            return Err(ControlError::PromotionBlocked(reason));
        }

        let name = self.lifecycle.instance_name();
        let current = self
            .lifecycle
            .status()
            .await?
            .ok_or_else(|| ControlError::NoInstance(name.to_string()))?;

        let health = self.verifier.check_instance(&name).await?;
        let concerns = self.policy.concerns(&record, Some(&health), Utc::now());
        if !concerns.is_empty() {
            let reason = concerns.join("; ");
            match self.policy.gate {
                PromotionGate::Advisory => {
                    warn!(reason = %reason, "Promoting despite unmet preconditions");
                    self.emit(KeelEvent::PromotionWarning { reason });
                }
                PromotionGate::RequireHealthy => {
                    warn!(reason = %reason, "Promotion blocked by policy");
                    self.emit(KeelEvent::PromotionBlocked {
                        reason: reason.clone(),
                    });
                    return Err(ControlError::PromotionBlocked(reason));
                }
            }
        }

        let handle = self.lifecycle.replace(&current.image, config).await?;

        self.transition(
            &mut record,
            PromotionStage::Live,
            TransitionTrigger::Promote,
            &confirmation.actor,
            None,
        )
        .await?;
        Ok(handle)
    }

    /// Run a health check and apply it to the stage.
    pub async fn observe(&self) -> ControlResult<HealthReport> {
        let report = self
            .verifier
            .check_instance(&self.lifecycle.instance_name())
            .await?;
        self.apply_observation(&report).await?;
        Ok(report)
    }

    /// LIVE with a healthy report carrying a heartbeat becomes MONITORING.
    ///
    /// The observed container must itself be running in live mode.
    pub async fn apply_observation(
        &self,
        report: &HealthReport,
    ) -> ControlResult<Option<StageTransition>> {
        let mut record = self.record().await?;
        if record.stage != PromotionStage::Live || !report.is_healthy() || !report.has_heartbeat()
        {
            return Ok(None);
        }
        if report.run_mode != Some(RunMode::Live) {
            warn!(
                run_mode = ?report.run_mode,
                "Healthy heartbeat from an instance not in live mode; staying in LIVE"
            );
            return Ok(None);
        }
        let transition = self
            .transition(
                &mut record,
                PromotionStage::Monitoring,
                TransitionTrigger::FirstHeartbeat,
                SYSTEM_ACTOR,
                None,
            )
            .await?;
        Ok(Some(transition))
    }

    /// Any stage back to SIMULATION.
    ///
    /// The stage is recorded before the container is touched, so a later
    /// deploy can never pick up live mode from a half-finished rollback.
    #[instrument(skip(self, config, reason), fields(mode = %mode))]
    pub async fn rollback(
        &self,
        mode: RollbackMode,
        config: &DeploymentConfig,
        actor: &str,
        reason: Option<String>,
    ) -> ControlResult<Option<InstanceHandle>> {
        let mut record = self.record().await?;
        self.transition(
            &mut record,
            PromotionStage::Simulation,
            TransitionTrigger::Rollback { mode },
            actor,
            reason,
        )
        .await?;

        let current = self.lifecycle.status().await?;
        match (mode, current) {
            (RollbackMode::Simulate, Some(state)) => {
                let simulated = config.with_run_mode(RunMode::Simulation);
                let handle = self.lifecycle.replace(&state.image, &simulated).await?;
                Ok(Some(handle))
            }
            (RollbackMode::Halt, Some(state))
                if state.status.is_running() || state.status == ContainerStatus::Restarting =>
            {
                self.lifecycle.stop().await?;
                Ok(None)
            }
            (RollbackMode::Halt, Some(state)) => {
                info!(status = %state.status, "Instance already stopped");
                Ok(None)
            }
            (_, None) => {
                warn!("No instance exists; stage reset only");
                Ok(None)
            }
        }
    }

    /// New code was deployed in SIMULATION; restart the observation window.
    pub async fn restart_observation(&self) -> ControlResult<()> {
        let mut record = self.record().await?;
        if record.stage == PromotionStage::Simulation {
            record.restart_observation(Utc::now());
            self.store.save(&record).await?;
        }
        Ok(())
    }

    async fn transition(
        &self,
        record: &mut StageRecord,
        to: PromotionStage,
        trigger: TransitionTrigger,
        actor: &str,
        reason: Option<String>,
    ) -> ControlResult<StageTransition> {
        let transition = StageTransition {
            from: record.stage,
            to,
            trigger,
            actor: actor.to_string(),
            reason,
            at: Utc::now(),
        };
        record.apply(transition.clone());
        self.store.save(record).await?;

        info!(from = %transition.from, to = %transition.to, actor = %transition.actor, "Stage changed");
        let envelope = KeelEventEnvelope::new(
            KeelEvent::StageChanged {
                from: transition.from,
                to: transition.to,
            },
            EventSource::Stage,
            &self.environment,
        )
        .with_actor(actor);
        let _ = self.event_tx.send(envelope);
        Ok(transition)
    }

    fn emit(&self, event: KeelEvent) {
        let envelope = KeelEventEnvelope::new(event, EventSource::Stage, &self.environment);
        let _ = self.event_tx.send(envelope);
    }
}
