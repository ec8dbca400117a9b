//! Error types for stage control and the pipeline

use keel_config::ConfigError;
use keel_container::ContainerError;
use keel_health::HealthError;
use keel_host::ProvisioningError;
use keel_sync::TransferError;
use keel_types::{PromotionStage, Step};
use thiserror::Error;

/// Stage controller errors
#[derive(Debug, Error)]
pub enum ControlError {
    /// Promotion attempted without the operator acknowledging the signal review
    #[error("promotion requires the operator to acknowledge the signal comparison")]
    ConfirmationRequired,

    /// Promotion refused by policy
    #[error("promotion blocked: {0}")]
    PromotionBlocked(String),

    /// Action not valid from the current stage
    #[error("cannot {action} from stage {from}")]
    InvalidTransition {
        from: PromotionStage,
        action: &'static str,
    },

    /// No instance to act on
    #[error("no instance '{0}' exists")]
    NoInstance(String),

    /// Container lifecycle failure
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Health check failure
    #[error(transparent)]
    Health(#[from] HealthError),

    /// A required part was not supplied to a builder
    #[error("incomplete setup: missing {0}")]
    Incomplete(&'static str),

    /// Stage record could not be read or written
    #[error("stage store error: {0}")]
    Store(String),
}

impl From<std::io::Error> for ControlError {
    fn from(e: std::io::Error) -> Self {
        ControlError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(e: serde_json::Error) -> Self {
        ControlError::Store(e.to_string())
    }
}

/// Result type for stage control
pub type ControlResult<T> = Result<T, ControlError>;

/// Underlying cause of a failed pipeline step
#[derive(Debug, Error)]
pub enum StepFailure {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Build(ContainerError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Control(#[from] ControlError),

    /// The instance crash-looped or exited after start
    #[error("instance FAILED: {0}")]
    Crashed(String),
}

/// A fatal error, tagged with the step it occurred in
#[derive(Debug, Error)]
#[error("[{step}] {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: StepFailure,
}

impl PipelineError {
    pub fn new(step: Step, source: impl Into<StepFailure>) -> Self {
        Self {
            step,
            source: source.into(),
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Attach a step to a fallible result.
pub(crate) trait AtStep<T> {
    fn at(self, step: Step) -> PipelineResult<T>;
}

impl<T, E: Into<StepFailure>> AtStep<T> for Result<T, E> {
    fn at(self, step: Step) -> PipelineResult<T> {
        self.map_err(|e| PipelineError::new(step, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_error_names_step() {
        let err = PipelineError::new(
            Step::Build,
            StepFailure::Build(ContainerError::MissingManifest {
                context: "/opt/keel/current".into(),
                file: "requirements.txt".into(),
            }),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("[build] "));
        assert!(msg.contains("requirements.txt"));
    }

    #[test]
    fn test_control_error_converts() {
        let err: StepFailure = ControlError::ConfirmationRequired.into();
        let err = PipelineError::new(Step::Promote, err);
        assert!(err.to_string().starts_with("[promote] promotion requires"));
    }
}
