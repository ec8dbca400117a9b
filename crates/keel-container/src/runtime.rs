//! Container runtime seam

use crate::error::ContainerResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_types::{ContainerInstance, ImageRef, InstanceName, InstanceState};

/// Which log lines to fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    /// Only lines after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only the last N lines
    pub tail: Option<usize>,
}

impl LogQuery {
    pub fn tail(lines: usize) -> Self {
        Self {
            since: None,
            tail: Some(lines),
        }
    }
}

/// Operations on the host's container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Files from `files` absent in the build context.
    async fn missing_files(&self, context: &str, files: &[String]) -> ContainerResult<Vec<String>>;

    /// Build `image` from the context directory.
    async fn build(&self, context: &str, image: &ImageRef) -> ContainerResult<()>;

    /// Current state of the named container, `None` if absent.
    async fn inspect(&self, name: &InstanceName) -> ContainerResult<Option<InstanceState>>;

    /// Write the env file the container reads its configuration from.
    async fn write_env_file(&self, path: &str, contents: &str) -> ContainerResult<()>;

    /// Start a detached container; returns its id.
    async fn run(&self, instance: &ContainerInstance) -> ContainerResult<String>;

    /// Stop the named container.
    async fn stop(&self, name: &InstanceName, timeout_secs: u64) -> ContainerResult<()>;

    /// Remove the named (stopped) container.
    async fn remove(&self, name: &InstanceName) -> ContainerResult<()>;

    /// Timestamped log lines (stdout and stderr interleaved).
    async fn logs(&self, name: &InstanceName, query: &LogQuery) -> ContainerResult<Vec<String>>;

    /// Host the runtime operates on
    fn target(&self) -> &str;
}
