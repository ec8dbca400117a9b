//! End-to-end deployment pipeline
//!
//! `deploy` runs the steps strictly in order and stops at the first fatal
//! error, leaving the results of earlier steps in place:
//!
//! ```text
//! config → provision → bootstrap → sync → build → replace → verify
//! ```
//!
//! The container is started with the run mode of the current promotion
//! stage. A deploy never promotes.

use crate::controller::StageController;
use crate::error::{AtStep, ControlError, ControlResult, PipelineError, PipelineResult, StepFailure};
use crate::policy::PromotionPolicy;
use crate::store::StageStore;
use keel_config::{ConfigResult, ConfigStore};
use keel_container::{ContainerConfig, ContainerLifecycleManager, ContainerRuntime, DockerCli};
use keel_health::{HealthConfig, HealthReport, HealthVerifier};
use keel_host::HostProvisioner;
use keel_remote::RemoteShell;
use keel_sync::{ArtifactSync, SyncReceipt};
use keel_types::{
    DeploymentConfig, EventSource, HealthStatus, HostHandle, HostSpec, ImageRef, InstanceHandle,
    KeelEvent, KeelEventEnvelope, PromotionStage, RunMode, Step,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

/// Produces the container runtime of a provisioned host
pub trait RuntimeFactory: Send + Sync {
    fn runtime_for(&self, host: &HostHandle) -> Arc<dyn ContainerRuntime>;
}

impl<F> RuntimeFactory for F
where
    F: Fn(&HostHandle) -> Arc<dyn ContainerRuntime> + Send + Sync,
{
    fn runtime_for(&self, host: &HostHandle) -> Arc<dyn ContainerRuntime> {
        self(host)
    }
}

/// Docker CLI over the remote shell
pub struct DockerRuntimes {
    shell: Arc<dyn RemoteShell>,
    sudo: bool,
}

impl DockerRuntimes {
    pub fn new(shell: Arc<dyn RemoteShell>) -> Self {
        Self { shell, sudo: false }
    }

    pub fn with_sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }
}

impl RuntimeFactory for DockerRuntimes {
    fn runtime_for(&self, host: &HostHandle) -> Arc<dyn ContainerRuntime> {
        let docker = DockerCli::new(self.shell.clone(), host.clone());
        if self.sudo {
            Arc::new(docker.with_sudo())
        } else {
            Arc::new(docker)
        }
    }
}

/// Where the deployment configuration is read from on every action
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Optional env file, overridden by the process environment
    Layered(Option<PathBuf>),
    /// A fixed set of values
    Fixed(ConfigStore),
}

impl ConfigSource {
    pub fn load(&self) -> ConfigResult<DeploymentConfig> {
        match self {
            ConfigSource::Layered(path) => ConfigStore::layered(path.as_deref())?.load(),
            ConfigSource::Fixed(store) => store.load(),
        }
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How long `deploy` waits for a HEALTHY or FAILED verdict (0 = one check)
    pub verify_timeout_secs: u64,
    pub verify_poll_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            verify_timeout_secs: 180,
            verify_poll_secs: 15,
        }
    }
}

/// What a successful deploy produced
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub host: HostHandle,
    pub release: SyncReceipt,
    pub image: ImageRef,
    pub instance: InstanceHandle,
    pub stage: PromotionStage,
    pub health: HealthReport,
}

/// Per-host handles for the container, health and stage operations
pub struct Session {
    pub host: HostHandle,
    pub lifecycle: Arc<ContainerLifecycleManager>,
    pub verifier: Arc<HealthVerifier>,
    pub controller: StageController,
}

/// The deployment pipeline for one environment
pub struct Pipeline {
    host_spec: HostSpec,
    config_source: ConfigSource,
    provisioner: Arc<HostProvisioner>,
    shell: Arc<dyn RemoteShell>,
    sync: Arc<ArtifactSync>,
    runtimes: Arc<dyn RuntimeFactory>,
    store: Arc<dyn StageStore>,
    container: ContainerConfig,
    health: HealthConfig,
    policy: PromotionPolicy,
    settings: PipelineConfig,
    event_tx: broadcast::Sender<KeelEventEnvelope>,
}

impl Pipeline {
    pub fn builder(host_spec: HostSpec) -> PipelineBuilder {
        PipelineBuilder::new(host_spec)
    }

    pub fn host_spec(&self) -> &HostSpec {
        &self.host_spec
    }

    pub fn provisioner(&self) -> &HostProvisioner {
        &self.provisioner
    }

    pub fn shell(&self) -> &dyn RemoteShell {
        self.shell.as_ref()
    }

    pub fn sync(&self) -> &ArtifactSync {
        &self.sync
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KeelEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Read and validate the deployment configuration.
    pub fn load_config(&self) -> PipelineResult<DeploymentConfig> {
        self.config_source.load().at(Step::Config)
    }

    /// Ensure the host and open a session on it.
    pub async fn connect(&self) -> PipelineResult<Session> {
        let host = self
            .provisioner
            .ensure_host(&self.host_spec)
            .await
            .at(Step::Provision)?;
        Ok(self.session(host))
    }

    /// Open a session on an already provisioned host.
    pub fn session(&self, host: HostHandle) -> Session {
        let runtime = self.runtimes.runtime_for(&host);
        let lifecycle = Arc::new(
            ContainerLifecycleManager::new(runtime.clone(), self.container.clone())
                .with_events(self.event_tx.clone()),
        );
        let verifier = Arc::new(
            HealthVerifier::new(runtime, self.health.clone()).with_events(self.event_tx.clone()),
        );
        let controller = StageController::new(
            self.store.clone(),
            lifecycle.clone(),
            verifier.clone(),
            self.policy.clone(),
        )
        .with_environment(host.name.clone())
        .with_events(self.event_tx.clone());

        Session {
            host,
            lifecycle,
            verifier,
            controller,
        }
    }

    /// Full deploy of the source tree at `source`.
    #[instrument(skip(self, source), fields(host = %self.host_spec.name, source = %source.display()))]
    pub async fn deploy(&self, source: &Path) -> PipelineResult<DeployOutcome> {
        match self.run_deploy(source).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(step = %e.step, error = %e.source, "Deploy failed");
                let envelope = KeelEventEnvelope::new(
                    KeelEvent::StepFailed {
                        step: e.step,
                        message: e.source.to_string(),
                    },
                    EventSource::Pipeline,
                    &self.host_spec.name,
                );
                let _ = self.event_tx.send(envelope);
                Err(e)
            }
        }
    }

    async fn run_deploy(&self, source: &Path) -> PipelineResult<DeployOutcome> {
        let config = self.load_config()?;

        let session = self.connect().await?;
        match &session.host.external_ip {
            Some(ip) => info!(address = %ip, "Host ready; the exchange allow-list must include this address"),
            None => warn!("Host has no external address"),
        }

        let layout = self.sync.layout();
        self.provisioner
            .bootstrap_runtime(self.shell.as_ref(), &session.host, &layout.base_dirs())
            .await
            .at(Step::Bootstrap)?;

        let release = self.sync.push(&session.host, source).await.at(Step::Sync)?;

        let image = session
            .lifecycle
            .build(&layout.current(), &release.release)
            .await
            .map_err(|e| PipelineError::new(Step::Build, StepFailure::Build(e)))?;

        let record = session.controller.record().await.at(Step::Replace)?;
        let run_mode = effective_run_mode(record.stage, config.run_mode);
        let instance = session
            .lifecycle
            .replace(&image, &config.with_run_mode(run_mode))
            .await
            .at(Step::Replace)?;
        session
            .controller
            .restart_observation()
            .await
            .at(Step::Replace)?;

        let health = self.verify(&session, &instance).await?;
        let stage = match session
            .controller
            .apply_observation(&health)
            .await
            .at(Step::Verify)?
        {
            Some(transition) => transition.to,
            None => record.stage,
        };

        info!(release = %release.release, image = %image, stage = %stage, health = %health.status, "Deploy complete");
        Ok(DeployOutcome {
            host: session.host,
            release,
            image,
            instance,
            stage,
            health,
        })
    }

    async fn verify(&self, session: &Session, instance: &InstanceHandle) -> PipelineResult<HealthReport> {
        let checked = if self.settings.verify_timeout_secs == 0 {
            session.verifier.check(instance).await
        } else {
            session
                .verifier
                .await_verdict(
                    instance,
                    Duration::from_secs(self.settings.verify_timeout_secs),
                    Duration::from_secs(self.settings.verify_poll_secs.max(1)),
                )
                .await
        };
        let report = checked.at(Step::Verify)?;

        if report.status == HealthStatus::Failed {
            return Err(PipelineError::new(
                Step::Verify,
                StepFailure::Crashed(report.findings.join("; ")),
            ));
        }
        Ok(report)
    }
}

/// Live only when both the stage and the operator's configuration say so.
pub fn effective_run_mode(stage: PromotionStage, configured: RunMode) -> RunMode {
    match (stage.run_mode(), configured) {
        (RunMode::Live, RunMode::Live) => RunMode::Live,
        (RunMode::Simulation, RunMode::Live) => {
            warn!(stage = %stage, "Configuration asks for live mode; running simulation until promoted");
            RunMode::Simulation
        }
        (RunMode::Live, RunMode::Simulation) => {
            warn!(stage = %stage, "Configuration asks for simulation in a live stage; running simulation");
            RunMode::Simulation
        }
        (RunMode::Simulation, RunMode::Simulation) => RunMode::Simulation,
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    host_spec: HostSpec,
    config_source: ConfigSource,
    provisioner: Option<Arc<HostProvisioner>>,
    shell: Option<Arc<dyn RemoteShell>>,
    sync: Option<Arc<ArtifactSync>>,
    runtimes: Option<Arc<dyn RuntimeFactory>>,
    store: Option<Arc<dyn StageStore>>,
    container: ContainerConfig,
    health: HealthConfig,
    policy: PromotionPolicy,
    settings: PipelineConfig,
    event_tx: Option<broadcast::Sender<KeelEventEnvelope>>,
}

impl PipelineBuilder {
    pub fn new(host_spec: HostSpec) -> Self {
        Self {
            host_spec,
            config_source: ConfigSource::Layered(None),
            provisioner: None,
            shell: None,
            sync: None,
            runtimes: None,
            store: None,
            container: ContainerConfig::default(),
            health: HealthConfig::default(),
            policy: PromotionPolicy::default(),
            settings: PipelineConfig::default(),
            event_tx: None,
        }
    }

    pub fn with_config_source(mut self, source: ConfigSource) -> Self {
        self.config_source = source;
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<HostProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn with_shell(mut self, shell: Arc<dyn RemoteShell>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn with_sync(mut self, sync: Arc<ArtifactSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_runtimes(mut self, runtimes: Arc<dyn RuntimeFactory>) -> Self {
        self.runtimes = Some(runtimes);
        self
    }

    pub fn with_stage_store(mut self, store: Arc<dyn StageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_container(mut self, container: ContainerConfig) -> Self {
        self.container = container;
        self
    }

    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn with_policy(mut self, policy: PromotionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: PipelineConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Share an existing event channel.
    pub fn with_events(mut self, event_tx: broadcast::Sender<KeelEventEnvelope>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn build(self) -> ControlResult<Pipeline> {
        let missing = |what: &'static str| ControlError::Incomplete(what);
        let event_tx = self
            .event_tx
            .unwrap_or_else(|| broadcast::channel(256).0);
        Ok(Pipeline {
            host_spec: self.host_spec,
            config_source: self.config_source,
            provisioner: self.provisioner.ok_or_else(|| missing("provisioner"))?,
            shell: self.shell.ok_or_else(|| missing("remote shell"))?,
            sync: self.sync.ok_or_else(|| missing("artifact sync"))?,
            runtimes: self.runtimes.ok_or_else(|| missing("runtime factory"))?,
            store: self.store.ok_or_else(|| missing("stage store"))?,
            container: self.container,
            health: self.health,
            policy: self.policy,
            settings: self.settings,
            event_tx,
        })
    }
}
