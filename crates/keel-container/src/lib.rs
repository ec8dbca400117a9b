//! # Keel Container
//!
//! Lifecycle of the single supervised container on a host.
//!
//! - [`ContainerLifecycleManager`]: `build`, `run`, `replace`, `stop`, `status`, `logs`
//! - [`ContainerRuntime`]: the runtime seam
//! - [`DockerCli`]: Docker CLI executed over a [`RemoteShell`](keel_remote::RemoteShell)
//! - [`InMemoryRuntime`]: deterministic runtime for tests
//!
//! `replace` is destructive (stop, remove, run). If the new instance fails to
//! start after the old one was removed, nothing is running until the next
//! successful `run`.

pub mod docker;
pub mod error;
pub mod manager;
pub mod memory;
pub mod runtime;

pub use docker::DockerCli;
pub use error::{ContainerError, ContainerResult};
pub use manager::{ContainerConfig, ContainerLifecycleManager};
pub use memory::InMemoryRuntime;
pub use runtime::{ContainerRuntime, LogQuery};
