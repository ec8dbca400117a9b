//! Keel Types - Core types for staged deployment
//!
//! Keel provisions a remote host, ships a service's source tree to it, runs the
//! service as a single supervised container, and promotes it through risk
//! stages before it is allowed to produce real-world side effects.
//!
//! ## Architectural Boundaries
//!
//! - **Keel** owns: host provisioning, artifact sync, container lifecycle,
//!   promotion stages, health verification
//! - **The supervised service** owns: decision logic, persistent state, order
//!   placement (consumed only through the container boundary)
//!
//! ## Key Concepts
//!
//! - **HostSpec**: What compute host to ensure
//! - **DeploymentConfig**: Immutable operating configuration for the service
//! - **ContainerInstance**: The single named container slot
//! - **PromotionStage**: Simulation, Live, Monitoring
//! - **Events**: Unified observability stream

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod events;
pub mod health;
pub mod host;
pub mod ids;
pub mod instance;
pub mod markers;
pub mod stage;
pub mod step;

// Re-export main types
pub use config::{
    keys, DeploymentConfig, ExchangeCredentials, LogLevel, NotificationIdentity, RunMode, Secret,
};
pub use events::{EventSeverity, EventSource, KeelEvent, KeelEventEnvelope};
pub use health::HealthStatus;
pub use host::{BootImage, DiskSpec, HostHandle, HostSpec, SpecValidationError};
pub use ids::{ImageRef, InstanceName, ReleaseId};
pub use instance::{
    ContainerInstance, ContainerStatus, InstanceHandle, InstanceState, RestartPolicy, VolumeMount,
};
pub use stage::{PromotionStage, RollbackMode, StageTransition, TransitionTrigger};
pub use step::Step;
