//! Wiring settings into a pipeline

use crate::settings::{Channel, OrchestratorSettings};
use anyhow::{bail, Context as _, Result};
use keel_container::ContainerLifecycleManager;
use keel_control::{
    effective_run_mode, ConfigSource, DockerRuntimes, JsonFileStageStore, Pipeline, Session,
};
use keel_host::{GcloudComputeApi, HostProvisioner};
use keel_remote::{GcloudShell, RemoteShell, SshShell};
use keel_sync::ArtifactSync;
use keel_types::{DeploymentConfig, ImageRef, InstanceHandle, ReleaseId, RunMode};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything a command needs
pub struct Context {
    pub settings: OrchestratorSettings,
    pub pipeline: Pipeline,
}

impl Context {
    pub fn new(settings: OrchestratorSettings) -> Result<Self> {
        let shell = remote_shell(&settings);
        let (event_tx, _) = broadcast::channel(256);

        let api = Arc::new(GcloudComputeApi::new(settings.remote.project.clone()));
        let provisioner = Arc::new(
            HostProvisioner::new(api, settings.provisioner.clone()).with_events(event_tx.clone()),
        );
        let sync = Arc::new(
            ArtifactSync::new(shell.clone(), settings.layout.clone(), settings.sync.clone())
                .with_events(event_tx.clone()),
        );
        let runtimes = Arc::new(DockerRuntimes::new(shell.clone()).with_sudo(settings.remote.sudo));
        let store = Arc::new(JsonFileStageStore::new(settings.stage_file()));

        let pipeline = Pipeline::builder(settings.host.clone())
            .with_config_source(ConfigSource::Layered(settings.env_file.clone()))
            .with_provisioner(provisioner)
            .with_shell(shell)
            .with_sync(sync)
            .with_runtimes(runtimes)
            .with_stage_store(store)
            .with_container(settings.container.clone())
            .with_health(settings.health.clone())
            .with_policy(settings.policy.clone())
            .with_settings(settings.pipeline.clone())
            .with_events(event_tx)
            .build()?;

        Ok(Self { settings, pipeline })
    }

    /// Ensure the host and open a session on it.
    pub async fn session(&self) -> Result<Session> {
        Ok(self.pipeline.connect().await?)
    }

    /// Deployment configuration with the run mode the current stage allows.
    pub async fn stage_config(&self, session: &Session) -> Result<DeploymentConfig> {
        let config = self.pipeline.load_config()?;
        let stage = session.controller.stage().await?;
        let run_mode = effective_run_mode(stage, config.run_mode);
        Ok(config.with_run_mode(run_mode))
    }

    /// Release the live path points at.
    pub async fn current_release(&self, session: &Session) -> Result<ReleaseId> {
        match self
            .pipeline
            .sync()
            .current_release(&session.host)
            .await
            .context("reading the live release")?
        {
            Some(release) => Ok(release),
            None => bail!("nothing has been synced to {} yet; run `keel sync` first", session.host.name),
        }
    }

    /// The image named on the command line, or the live release's image.
    pub async fn image(&self, session: &Session, explicit: Option<&str>) -> Result<ImageRef> {
        match explicit {
            Some(image) => Ok(ImageRef::parse(image)),
            None => {
                let release = self.current_release(session).await?;
                Ok(ImageRef::for_release(
                    self.settings.container.repository.clone(),
                    &release,
                ))
            }
        }
    }

    /// Handle of the running instance, for repeated health checks.
    pub async fn instance(&self, lifecycle: &ContainerLifecycleManager) -> Result<Option<InstanceHandle>> {
        let Some(state) = lifecycle.status().await? else {
            return Ok(None);
        };
        let Some(started_at) = state.started_at else {
            return Ok(None);
        };
        Ok(Some(InstanceHandle {
            name: state.name,
            container_id: state.container_id,
            image: state.image,
            run_mode: state.run_mode.unwrap_or(RunMode::Simulation),
            started_at,
        }))
    }
}

fn remote_shell(settings: &OrchestratorSettings) -> Arc<dyn RemoteShell> {
    let remote = &settings.remote;
    match remote.channel {
        Channel::Gcloud => {
            let mut shell = GcloudShell::new();
            if let Some(project) = &remote.project {
                shell = shell.with_project(project.clone());
            }
            if let Some(user) = &remote.user {
                shell = shell.with_user(user.clone());
            }
            Arc::new(shell)
        }
        Channel::Ssh => {
            let user = remote.user.clone().unwrap_or_else(|| "keel".to_string());
            let mut shell = SshShell::new(user).with_port(remote.port);
            if let Some(identity) = &remote.identity_file {
                shell = shell.with_identity_file(identity.clone());
            }
            Arc::new(shell)
        }
    }
}
