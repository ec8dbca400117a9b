//! # Keel Control
//!
//! Promotion stages and the deployment pipeline.
//!
//! ## Stages
//!
//! ```text
//!              promote (operator)          first heartbeat
//! SIMULATION ──────────────────────▶ LIVE ─────────────────▶ MONITORING
//!     ▲                                │                          │
//!     └──────── rollback (operator) ───┴──────────────────────────┘
//! ```
//!
//! The stage determines the run mode the container is started with. The
//! [`StageController`] never moves toward a riskier stage without an
//! explicit operator trigger. Promotion preconditions (observation window,
//! health) are advisory by default; see [`PromotionGate`].
//!
//! ## Pipeline
//!
//! [`Pipeline::deploy`] runs config, provision, bootstrap, sync, build,
//! replace and verify in order. A failure is reported as a
//! [`PipelineError`] naming the step, e.g. `[build] missing requirements.txt`.
//!
//! The stage record is kept on the operator machine through a
//! [`StageStore`] so it survives restarts of the orchestrator.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod controller;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod record;
pub mod store;

pub use controller::StageController;
pub use error::{ControlError, ControlResult, PipelineError, PipelineResult, StepFailure};
pub use pipeline::{
    effective_run_mode, ConfigSource, DeployOutcome, DockerRuntimes, Pipeline, PipelineBuilder,
    PipelineConfig, RuntimeFactory, Session,
};
pub use policy::{OperatorConfirmation, PromotionGate, PromotionPolicy};
pub use record::StageRecord;
pub use store::{InMemoryStageStore, JsonFileStageStore, StageStore};
