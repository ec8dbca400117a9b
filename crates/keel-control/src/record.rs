//! Persistent stage record

use chrono::{DateTime, Utc};
use keel_types::{PromotionStage, RunMode, StageTransition};
use serde::{Deserialize, Serialize};

/// Current promotion stage and how it got there
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: PromotionStage,
    pub run_mode: RunMode,
    pub entered_at: DateTime<Utc>,
    /// Start of the current simulation observation window
    pub simulation_started_at: DateTime<Utc>,
    pub last_transition: Option<StageTransition>,
    #[serde(default)]
    pub history: Vec<StageTransition>,
}

impl StageRecord {
    /// Fresh record in SIMULATION.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            stage: PromotionStage::Simulation,
            run_mode: RunMode::Simulation,
            entered_at: now,
            simulation_started_at: now,
            last_transition: None,
            history: Vec::new(),
        }
    }

    /// Seconds spent observing the current simulation run.
    pub fn observed_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.simulation_started_at).num_seconds().max(0)
    }

    /// Apply a transition and keep it in the history.
    pub fn apply(&mut self, transition: StageTransition) {
        self.stage = transition.to;
        self.run_mode = transition.to.run_mode();
        self.entered_at = transition.at;
        if transition.to == PromotionStage::Simulation {
            self.simulation_started_at = transition.at;
        }
        self.history.push(transition.clone());
        self.last_transition = Some(transition);
    }

    /// New code entered simulation; its observation window starts now.
    pub fn restart_observation(&mut self, now: DateTime<Utc>) {
        if self.stage == PromotionStage::Simulation {
            self.simulation_started_at = now;
        }
    }
}
