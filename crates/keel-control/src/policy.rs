//! Promotion policy

use crate::record::StageRecord;
use chrono::{DateTime, Utc};
use keel_health::HealthReport;
use serde::{Deserialize, Serialize};

/// How promotion preconditions are enforced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PromotionGate {
    /// Warn on unmet preconditions and proceed
    #[default]
    Advisory,
    /// Refuse promotion unless the observation window passed and health is HEALTHY
    RequireHealthy,
}

/// Preconditions for SIMULATION to LIVE
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionPolicy {
    /// Minimum time in simulation before promotion (seconds)
    pub min_observation_secs: u64,
    pub gate: PromotionGate,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self {
            min_observation_secs: 24 * 3600,
            gate: PromotionGate::Advisory,
        }
    }
}

impl PromotionPolicy {
    /// Unmet preconditions, empty when promotion is clean.
    pub fn concerns(
        &self,
        record: &StageRecord,
        health: Option<&HealthReport>,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut concerns = Vec::new();

        let observed = record.observed_secs(now);
        if observed < self.min_observation_secs as i64 {
            concerns.push(format!(
                "observed in simulation for {}h{:02}m, policy asks for {}h",
                observed / 3600,
                (observed % 3600) / 60,
                self.min_observation_secs / 3600
            ));
        }

        match health {
            Some(report) if report.is_healthy() => {}
            Some(report) => concerns.push(format!("instance is {}", report.status)),
            None => concerns.push("no instance to verify".to_string()),
        }

        concerns
    }
}

/// Operator sign-off on a promotion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfirmation {
    pub actor: String,
    /// Detected signals were compared against an independent reference
    pub acknowledged_signals: bool,
}

impl OperatorConfirmation {
    pub fn new(actor: impl Into<String>, acknowledged_signals: bool) -> Self {
        Self {
            actor: actor.into(),
            acknowledged_signals,
        }
    }
}
