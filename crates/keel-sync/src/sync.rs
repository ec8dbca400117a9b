//! Artifact Sync - upload, staging and atomic activation of releases

use crate::error::{TransferError, TransferResult};
use crate::layout::RemoteLayout;
use crate::pack::{pack, PackManifest, PackOptions};
use keel_remote::{shell_quote, RemoteShell};
use keel_types::{
    DeploymentConfig, EventSource, HostHandle, KeelEvent, KeelEventEnvelope, ReleaseId,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Releases kept on the host after a successful swap
    pub keep_releases: usize,

    /// Packing rules
    pub pack: PackOptions,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            keep_releases: 3,
            pack: PackOptions::default(),
        }
    }
}

/// Result of a successful push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReceipt {
    pub release: ReleaseId,
    pub digest: String,
    pub files: usize,
    pub bytes: u64,
    /// Remote path of the release directory
    pub path: String,
}

/// Uploads source releases and swaps the live path
pub struct ArtifactSync {
    shell: Arc<dyn RemoteShell>,
    layout: RemoteLayout,
    config: SyncConfig,
    event_tx: broadcast::Sender<KeelEventEnvelope>,
}

impl ArtifactSync {
    pub fn new(shell: Arc<dyn RemoteShell>, layout: RemoteLayout, config: SyncConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            shell,
            layout,
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

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    /// Upload `source` as a new release and make it live.
    ///
    /// On any failure the staging area is removed and `current` keeps
    /// pointing at the previous release.
    #[instrument(skip(self, host, source), fields(host = %host.name, source = %source.display()))]
    pub async fn push(&self, host: &HostHandle, source: &Path) -> TransferResult<SyncReceipt> {
        let (archive, manifest) = self.pack_local(source).await?;
        let release = ReleaseId::from_digest(&manifest.digest);

        info!(release = %release, files = manifest.files, bytes = manifest.bytes, "Packed release");

        let staging = self.layout.staging_dir(&release);
        let remote_archive = self.layout.staging_archive(&release);

        if let Err(e) = self
            .stage(host, archive.path(), &remote_archive, &staging)
            .await
        {
            self.cleanup(host, &staging, &remote_archive).await;
            return Err(e);
        }

        let release_dir = self.layout.release_dir(&release);
        if let Err(e) = self.activate(host, &staging, &release_dir).await {
            self.cleanup(host, &staging, &remote_archive).await;
            return Err(e);
        }

        // Activation already happened; a failed prune only leaves extra releases.
        if let Err(e) = self.prune(host, &release).await {
            warn!(error = %e, "Pruning old releases failed");
        }

        info!(release = %release, path = %release_dir, "Release activated");
        self.emit_event(
            KeelEvent::ReleaseActivated {
                release: release.clone(),
                files: manifest.files,
            },
            &host.name,
        );

        Ok(SyncReceipt {
            release,
            digest: manifest.digest,
            files: manifest.files,
            bytes: manifest.bytes,
            path: release_dir,
        })
    }

    /// Write the rendered configuration to the shared env file (mode 0600).
    #[instrument(skip(self, host, config), fields(host = %host.name, run_mode = %config.run_mode))]
    pub async fn push_env(&self, host: &HostHandle, config: &DeploymentConfig) -> TransferResult<String> {
        let path = self.layout.env_file();
        self.shell
            .write_file(host, &path, config.render_env_file().as_bytes(), 0o600)
            .await
            .map_err(TransferError::Env)?;

        info!(path = %path, "Configuration injected");
        self.emit_event(
            KeelEvent::ConfigInjected {
                run_mode: config.run_mode,
            },
            &host.name,
        );
        Ok(path)
    }

    /// Release the live path currently points at, if any.
    pub async fn current_release(&self, host: &HostHandle) -> TransferResult<Option<ReleaseId>> {
        let out = self
            .shell
            .exec(host, &format!("readlink {}", shell_quote(&self.layout.current())))
            .await?;
        if !out.success() {
            return Ok(None);
        }
        Ok(out
            .stdout
            .trim()
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(ReleaseId::new))
    }

    async fn pack_local(&self, source: &Path) -> TransferResult<(tempfile::NamedTempFile, PackManifest)> {
        let source: PathBuf = source.to_path_buf();
        let options = self.config.pack.clone();

        tokio::task::spawn_blocking(move || {
            let archive = tempfile::Builder::new()
                .prefix("keel-release-")
                .suffix(".tar.gz")
                .tempfile()?;
            let manifest = pack(&source, archive.as_file(), &options)?;
            Ok::<_, TransferError>((archive, manifest))
        })
        .await
        .map_err(|e| TransferError::Join(e.to_string()))?
    }

    async fn stage(
        &self,
        host: &HostHandle,
        local_archive: &Path,
        remote_archive: &str,
        staging: &str,
    ) -> TransferResult<()> {
        self.shell
            .exec_checked(
                host,
                &format!(
                    "mkdir -p {releases} && rm -rf {staging} && mkdir -p {staging}",
                    releases = shell_quote(&self.layout.releases_dir()),
                    staging = shell_quote(staging),
                ),
            )
            .await?;

        self.shell
            .upload(host, local_archive, remote_archive)
            .await
            .map_err(TransferError::Upload)?;

        self.shell
            .exec_checked(
                host,
                &format!(
                    "tar -xzf {archive} -C {staging} && rm -f {archive}",
                    archive = shell_quote(remote_archive),
                    staging = shell_quote(staging),
                ),
            )
            .await
            .map_err(TransferError::Extract)?;
        Ok(())
    }

    /// Move staging into place and atomically re-point `current`.
    async fn activate(&self, host: &HostHandle, staging: &str, release_dir: &str) -> TransferResult<()> {
        let current = self.layout.current();
        let tmp_link = format!("{}.keel-tmp", current);
        let script = format!(
            "if [ -d {release} ]; then rm -rf {staging}; else mv {staging} {release}; fi \
             && ln -sfn {release} {tmp} && mv -T {tmp} {current}",
            release = shell_quote(release_dir),
            staging = shell_quote(staging),
            tmp = shell_quote(&tmp_link),
            current = shell_quote(&current),
        );
        self.shell
            .exec_checked(host, &script)
            .await
            .map_err(TransferError::Activate)?;
        Ok(())
    }

    async fn prune(&self, host: &HostHandle, live: &ReleaseId) -> TransferResult<()> {
        let releases = self.layout.releases_dir();
        let out = self
            .shell
            .exec_checked(host, &format!("ls -1t {}", shell_quote(&releases)))
            .await?;

        let stale: Vec<String> = out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != live.as_str())
            .skip(self.config.keep_releases.saturating_sub(1))
            .map(|name| shell_quote(&format!("{}/{}", releases, name)))
            .collect();

        if stale.is_empty() {
            return Ok(());
        }
        info!(count = stale.len(), "Pruning old releases");
        self.shell
            .exec_checked(host, &format!("rm -rf {}", stale.join(" ")))
            .await?;
        Ok(())
    }

    async fn cleanup(&self, host: &HostHandle, staging: &str, remote_archive: &str) {
        let cmd = format!(
            "rm -rf {} {}",
            shell_quote(staging),
            shell_quote(remote_archive)
        );
        if let Err(e) = self.shell.exec(host, &cmd).await {
            warn!(error = %e, "Failed to clean up staging area");
        }
    }

    fn emit_event(&self, event: KeelEvent, environment: &str) {
        let envelope = KeelEventEnvelope::new(event, EventSource::Sync, environment);
        let _ = self.event_tx.send(envelope);
    }
}
