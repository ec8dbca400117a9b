//! # Keel Host
//!
//! Idempotent provisioning of the compute host that runs the supervised
//! service, and bootstrap of its container runtime.
//!
//! All provisioning calls are upserts keyed by stable name: calling
//! [`HostProvisioner::ensure_host`] twice with the same spec yields the same
//! host. Only transient API failures are retried, with bounded exponential
//! backoff; quota and permission errors surface verbatim.

pub mod api;
pub mod error;
pub mod gcloud;
pub mod memory;
pub mod provisioner;
pub mod retry;

pub use api::{ComputeApi, FirewallRule};
pub use error::{ProvisioningError, ProvisioningResult};
pub use gcloud::GcloudComputeApi;
pub use memory::{ApiOp, InMemoryComputeApi};
pub use provisioner::{BootstrapOutcome, HostProvisioner, ProvisionerConfig};
pub use retry::RetryConfig;
