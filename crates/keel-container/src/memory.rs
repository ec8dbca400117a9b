//! In-memory container runtime

use crate::error::{ContainerError, ContainerResult};
use crate::runtime::{ContainerRuntime, LogQuery};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use keel_types::{
    ContainerInstance, ContainerStatus, ImageRef, InstanceName, InstanceState, RunMode,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct FakeContainer {
    state: InstanceState,
    logs: Vec<String>,
}

/// In-memory runtime with scripted failures and logs
///
/// Containers start in `running`; tests drive status, restarts and log
/// output through the helper methods.
pub struct InMemoryRuntime {
    target: String,
    containers: DashMap<String, FakeContainer>,
    images: DashSet<String>,
    contexts: DashMap<String, HashSet<String>>,
    env_files: DashMap<String, String>,
    fail_build: Mutex<Option<String>>,
    fail_run: Mutex<Option<String>>,
    next_id: AtomicU64,
    runs: AtomicU64,
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl InMemoryRuntime {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            containers: DashMap::new(),
            images: DashSet::new(),
            contexts: DashMap::new(),
            env_files: DashMap::new(),
            fail_build: Mutex::new(None),
            fail_run: Mutex::new(None),
            next_id: AtomicU64::new(0),
            runs: AtomicU64::new(0),
        }
    }

    /// Declare the files present in a build context.
    pub fn add_context(&self, context: &str, files: &[&str]) {
        self.contexts.insert(
            context.to_string(),
            files.iter().map(|f| f.to_string()).collect(),
        );
    }

    /// Fail the next build with `message`.
    pub fn fail_next_build(&self, message: impl Into<String>) {
        *lock(&self.fail_build) = Some(message.into());
    }

    /// Fail the next run with `message`.
    pub fn fail_next_run(&self, message: impl Into<String>) {
        *lock(&self.fail_run) = Some(message.into());
    }

    pub fn has_image(&self, image: &ImageRef) -> bool {
        self.images.contains(&image.to_string())
    }

    /// Append a log line (timestamped now) to a container.
    pub fn push_log(&self, name: &str, line: impl AsRef<str>) {
        let stamped = format!("{} {}", Utc::now().to_rfc3339(), line.as_ref());
        self.push_raw_log(name, stamped);
    }

    /// Append a log line verbatim.
    pub fn push_raw_log(&self, name: &str, line: impl Into<String>) {
        if let Some(mut c) = self.containers.get_mut(name) {
            c.logs.push(line.into());
        }
    }

    pub fn set_status(&self, name: &str, status: ContainerStatus) {
        if let Some(mut c) = self.containers.get_mut(name) {
            c.state.status = status;
        }
    }

    /// Record a restart by the restart policy.
    pub fn record_restart(&self, name: &str) {
        if let Some(mut c) = self.containers.get_mut(name) {
            c.state.restart_count += 1;
            c.state.started_at = Some(Utc::now());
        }
    }

    /// Shift the container's start time into the past.
    pub fn age(&self, name: &str, secs: i64) {
        if let Some(mut c) = self.containers.get_mut(name) {
            c.state.started_at = c
                .state
                .started_at
                .map(|t| t - chrono::Duration::seconds(secs));
        }
    }

    pub fn env_file(&self, path: &str) -> Option<String> {
        self.env_files.get(path).map(|s| s.clone())
    }

    pub fn container(&self, name: &str) -> Option<InstanceState> {
        self.containers.get(name).map(|c| c.state.clone())
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    /// Number of successful `run` calls.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn missing_files(&self, context: &str, files: &[String]) -> ContainerResult<Vec<String>> {
        let present = self.contexts.get(context);
        Ok(files
            .iter()
            .filter(|f| present.as_ref().map(|p| !p.contains(*f)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn build(&self, _context: &str, image: &ImageRef) -> ContainerResult<()> {
        if let Some(message) = lock(&self.fail_build).take() {
            return Err(ContainerError::Build {
                image: image.to_string(),
                message,
            });
        }
        self.images.insert(image.to_string());
        Ok(())
    }

    async fn inspect(&self, name: &InstanceName) -> ContainerResult<Option<InstanceState>> {
        Ok(self.container(name.as_str()))
    }

    async fn write_env_file(&self, path: &str, contents: &str) -> ContainerResult<()> {
        self.env_files.insert(path.to_string(), contents.to_string());
        Ok(())
    }

    async fn run(&self, instance: &ContainerInstance) -> ContainerResult<String> {
        if let Some(existing) = self.containers.get(instance.name.as_str()) {
            return Err(ContainerError::NameConflict {
                name: instance.name.to_string(),
                container_id: existing.state.container_id.clone(),
            });
        }
        if let Some(message) = lock(&self.fail_run).take() {
            return Err(ContainerError::Runtime(message));
        }
        if !self.has_image(&instance.image) {
            return Err(ContainerError::Runtime(format!(
                "Unable to find image '{}' locally",
                instance.image
            )));
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let container_id = format!("{:064x}", n);

        // Read the run mode back from the injected env file, like the service does.
        let run_mode = self
            .env_file(&instance.env_file)
            .and_then(|env| {
                env.lines()
                    .find_map(|l| l.strip_prefix("DRY_RUN=").map(|v| v.trim() == "true"))
            })
            .map(RunMode::from_dry_run);

        self.containers.insert(
            instance.name.to_string(),
            FakeContainer {
                state: InstanceState {
                    name: instance.name.clone(),
                    container_id: container_id.clone(),
                    image: instance.image.clone(),
                    status: ContainerStatus::Running,
                    restart_count: 0,
                    started_at: Some(Utc::now()),
                    finished_at: None,
                    run_mode,
                },
                logs: Vec::new(),
            },
        );
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(container_id)
    }

    async fn stop(&self, name: &InstanceName, _timeout_secs: u64) -> ContainerResult<()> {
        let mut c = self
            .containers
            .get_mut(name.as_str())
            .ok_or_else(|| ContainerError::NotFound(name.to_string()))?;
        c.state.status = ContainerStatus::Exited { exit_code: 0 };
        c.state.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn remove(&self, name: &InstanceName) -> ContainerResult<()> {
        if let Some(c) = self.containers.get(name.as_str()) {
            if c.state.status.is_running() {
                return Err(ContainerError::Runtime(format!(
                    "cannot remove container {}: container is running",
                    name
                )));
            }
        }
        self.containers
            .remove(name.as_str())
            .map(|_| ())
            .ok_or_else(|| ContainerError::NotFound(name.to_string()))
    }

    async fn logs(&self, name: &InstanceName, query: &LogQuery) -> ContainerResult<Vec<String>> {
        let c = self
            .containers
            .get(name.as_str())
            .ok_or_else(|| ContainerError::NotFound(name.to_string()))?;
        let lines = &c.logs;
        let start = match query.tail {
            Some(n) => lines.len().saturating_sub(n),
            None => 0,
        };
        Ok(lines[start..].to_vec())
    }

    fn target(&self) -> &str {
        &self.target
    }
}
