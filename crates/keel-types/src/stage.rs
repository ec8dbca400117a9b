//! Promotion stages
//!
//! Stages only change on an explicit external trigger. The controller that
//! drives them lives in `keel-control`; these are the shared value types.

use crate::RunMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk stage of the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionStage {
    /// Decision points are observed but never executed
    #[default]
    Simulation,
    /// Live run mode, waiting for the first heartbeat
    Live,
    /// Steady state: live and verified
    Monitoring,
}

impl PromotionStage {
    /// Run mode the container must carry in this stage.
    pub fn run_mode(&self) -> RunMode {
        match self {
            PromotionStage::Simulation => RunMode::Simulation,
            PromotionStage::Live | PromotionStage::Monitoring => RunMode::Live,
        }
    }
}

impl fmt::Display for PromotionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromotionStage::Simulation => write!(f, "SIMULATION"),
            PromotionStage::Live => write!(f, "LIVE"),
            PromotionStage::Monitoring => write!(f, "MONITORING"),
        }
    }
}

/// How a rollback takes the service out of live mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackMode {
    /// Replace the container with run-mode=simulation
    Simulate,
    /// Stop the container entirely
    Halt,
}

impl fmt::Display for RollbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackMode::Simulate => write!(f, "simulate"),
            RollbackMode::Halt => write!(f, "halt"),
        }
    }
}

/// What caused a stage transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionTrigger {
    /// Operator promoted simulation to live
    Promote,
    /// First liveness heartbeat observed after going live
    FirstHeartbeat,
    /// Operator emergency rollback
    Rollback { mode: RollbackMode },
}

/// One recorded stage transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: PromotionStage,
    pub to: PromotionStage,
    pub trigger: TransitionTrigger,
    pub actor: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}
