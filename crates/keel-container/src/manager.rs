//! Container Lifecycle Manager - build, run, replace and stop the service

use crate::error::{ContainerError, ContainerResult};
use crate::runtime::{ContainerRuntime, LogQuery};
use chrono::Utc;
use keel_types::{
    ContainerInstance, ContainerStatus, DeploymentConfig, EventSource, ImageRef, InstanceHandle, InstanceName,
    InstanceState, KeelEvent, KeelEventEnvelope, ReleaseId, RestartPolicy, VolumeMount,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

/// Container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Name of the single container slot
    pub name: String,

    /// Image repository; tags are release ids
    pub repository: String,

    /// Build manifest expected in the build context
    pub build_manifest: String,

    /// Dependency manifest expected in the build context
    pub dependency_manifest: String,

    /// Remote env file the container reads its configuration from
    pub env_file: String,

    /// Persistent state directory on the host
    pub volume_host_path: String,

    /// Where the state directory appears inside the container
    pub volume_container_path: String,

    /// Restart policy
    pub restart_policy: RestartPolicy,

    /// Grace period for `stop`
    pub stop_timeout_secs: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "bot".to_string(),
            repository: "trading-bot".to_string(),
            build_manifest: "Dockerfile".to_string(),
            dependency_manifest: "requirements.txt".to_string(),
            env_file: "/opt/keel/shared/.env".to_string(),
            volume_host_path: "/opt/keel/data".to_string(),
            volume_container_path: "/app/data".to_string(),
            restart_policy: RestartPolicy::UnlessStopped,
            stop_timeout_secs: 30,
        }
    }
}

impl ContainerConfig {
    pub fn instance_name(&self) -> InstanceName {
        InstanceName::new(self.name.clone())
    }
}

/// Manages the named container slot on one host
pub struct ContainerLifecycleManager {
    runtime: Arc<dyn ContainerRuntime>,
    config: ContainerConfig,
    event_tx: broadcast::Sender<KeelEventEnvelope>,
}

impl ContainerLifecycleManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: ContainerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            runtime,
            config,
            event_tx,
        }
    }

    /// Share an existing event channel.
    pub fn with_events(mut self, event_tx: broadcast::Sender<KeelEventEnvelope>) -> Self {
        self.event_tx = event_tx;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeelEventEnvelope> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn instance_name(&self) -> InstanceName {
        self.config.instance_name()
    }

    /// Build the image for `release` from the source tree at `source_path`.
    ///
    /// Fails before invoking the runtime if a manifest is missing. Never
    /// touches a running instance.
    #[instrument(skip(self), fields(target = %self.runtime.target()))]
    pub async fn build(&self, source_path: &str, release: &ReleaseId) -> ContainerResult<ImageRef> {
        let required = vec![
            self.config.build_manifest.clone(),
            self.config.dependency_manifest.clone(),
        ];
        let missing = self.runtime.missing_files(source_path, &required).await?;
        if let Some(file) = missing.into_iter().next() {
            return Err(ContainerError::MissingManifest {
                context: source_path.to_string(),
                file,
            });
        }

        let image = ImageRef::for_release(self.config.repository.clone(), release);
        info!(image = %image, "Building image");
        self.runtime.build(source_path, &image).await?;

        info!(image = %image, "Image built");
        self.emit_event(KeelEvent::ImageBuilt {
            image: image.clone(),
        });
        Ok(image)
    }

    /// Start the named instance from `image` with `config` injected.
    ///
    /// Fails fast with [`ContainerError::NameConflict`] if the slot is taken;
    /// the existing instance is left untouched.
    #[instrument(skip(self, config), fields(target = %self.runtime.target(), run_mode = %config.run_mode))]
    pub async fn run(
        &self,
        image: &ImageRef,
        config: &DeploymentConfig,
    ) -> ContainerResult<InstanceHandle> {
        let name = self.instance_name();
        if let Some(existing) = self.runtime.inspect(&name).await? {
            warn!(container_id = %existing.container_id, "Instance already exists, refusing to run");
            return Err(ContainerError::NameConflict {
                name: name.to_string(),
                container_id: existing.container_id,
            });
        }
        self.start(image, config).await
    }

    /// Stop and remove the existing instance, then run the new one.
    ///
    /// Without an existing instance this is a plain `run`.
    #[instrument(skip(self, config), fields(target = %self.runtime.target(), run_mode = %config.run_mode))]
    pub async fn replace(
        &self,
        image: &ImageRef,
        config: &DeploymentConfig,
    ) -> ContainerResult<InstanceHandle> {
        let name = self.instance_name();
        match self.runtime.inspect(&name).await? {
            Some(existing) => {
                info!(
                    container_id = %existing.container_id,
                    old_image = %existing.image,
                    new_image = %image,
                    "Replacing instance"
                );
                self.stop_and_remove(&name, &existing).await?;
            }
            None => {
                warn!("No existing instance to replace, running a new one");
            }
        }

        match self.start(image, config).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                error!(error = %e, "New instance failed to start; no instance is running");
                Err(e)
            }
        }
    }

    /// Operator halt: stop the instance and keep it for inspection.
    #[instrument(skip(self), fields(target = %self.runtime.target()))]
    pub async fn stop(&self) -> ContainerResult<()> {
        let name = self.instance_name();
        self.runtime
            .stop(&name, self.config.stop_timeout_secs)
            .await?;
        info!(name = %name, "Instance stopped");
        self.emit_event(KeelEvent::InstanceStopped { name });
        Ok(())
    }

    /// Runtime state of the instance, if it exists.
    pub async fn status(&self) -> ContainerResult<Option<InstanceState>> {
        self.runtime.inspect(&self.instance_name()).await
    }

    /// Timestamped log lines of the instance.
    pub async fn logs(&self, query: &LogQuery) -> ContainerResult<Vec<String>> {
        self.runtime.logs(&self.instance_name(), query).await
    }

    async fn stop_and_remove(
        &self,
        name: &InstanceName,
        existing: &InstanceState,
    ) -> ContainerResult<()> {
        if existing.status.is_running() || existing.status == ContainerStatus::Restarting {
            self.runtime
                .stop(name, self.config.stop_timeout_secs)
                .await?;
            self.emit_event(KeelEvent::InstanceStopped { name: name.clone() });
        }
        self.runtime.remove(name).await?;
        self.emit_event(KeelEvent::InstanceRemoved { name: name.clone() });
        Ok(())
    }

    async fn start(
        &self,
        image: &ImageRef,
        config: &DeploymentConfig,
    ) -> ContainerResult<InstanceHandle> {
        let name = self.instance_name();
        self.runtime
            .write_env_file(&self.config.env_file, &config.render_env_file())
            .await?;

        let instance = ContainerInstance {
            name: name.clone(),
            image: image.clone(),
            restart_policy: self.config.restart_policy,
            volume: VolumeMount::new(
                self.config.volume_host_path.clone(),
                self.config.volume_container_path.clone(),
            ),
            env_file: self.config.env_file.clone(),
            run_mode: config.run_mode,
        };

        let container_id = self.runtime.run(&instance).await?;
        let handle = InstanceHandle {
            name: name.clone(),
            container_id,
            image: image.clone(),
            run_mode: config.run_mode,
            started_at: Utc::now(),
        };

        info!(
            name = %name,
            container_id = %handle.short_id(),
            image = %image,
            run_mode = %config.run_mode,
            "Instance started"
        );
        self.emit_event(KeelEvent::InstanceStarted {
            name,
            image: image.clone(),
            run_mode: config.run_mode,
        });
        Ok(handle)
    }

    fn emit_event(&self, event: KeelEvent) {
        let envelope = KeelEventEnvelope::new(event, EventSource::Container, self.runtime.target());
        let _ = self.event_tx.send(envelope);
    }
}
