//! SSH-based shells

use crate::error::{RemoteError, RemoteResult};
use crate::process::{self, CommandOutput};
use crate::shell::{atomic_write_script, RemoteShell};
use async_trait::async_trait;
use keel_types::HostHandle;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Plain OpenSSH client against the host's external address
#[derive(Debug, Clone)]
pub struct SshShell {
    user: String,
    identity_file: Option<PathBuf>,
    port: u16,
    connect_timeout_secs: u64,
    command_timeout: Duration,
}

impl SshShell {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            identity_file: None,
            port: 22,
            connect_timeout_secs: 10,
            command_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    fn destination(&self, host: &HostHandle) -> RemoteResult<String> {
        let ip = host
            .external_ip
            .as_deref()
            .ok_or_else(|| RemoteError::NoAddress(host.name.clone()))?;
        Ok(format!("{}@{}", self.user, ip))
    }

    /// Options shared by ssh and scp. Never prompts.
    fn common_args(&self, cmd: &mut Command) {
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs));
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
    }

    fn ssh_command(&self, host: &HostHandle, remote: &str) -> RemoteResult<Command> {
        let mut cmd = Command::new("ssh");
        self.common_args(&mut cmd);
        cmd.arg("-p")
            .arg(self.port.to_string())
            .arg(self.destination(host)?)
            .arg("--")
            .arg(remote);
        Ok(cmd)
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn exec(&self, host: &HostHandle, command: &str) -> RemoteResult<CommandOutput> {
        let cmd = self.ssh_command(host, command)?;
        process::run(cmd, command, None, self.command_timeout).await
    }

    async fn upload(&self, host: &HostHandle, local: &Path, remote: &str) -> RemoteResult<()> {
        let mut cmd = Command::new("scp");
        self.common_args(&mut cmd);
        cmd.arg("-P")
            .arg(self.port.to_string())
            .arg(local)
            .arg(format!("{}:{}", self.destination(host)?, remote));

        let label = format!("scp {} {}", local.display(), remote);
        debug!(host = %host.name, remote = %remote, "Uploading file");
        process::run(cmd, &label, None, self.command_timeout)
            .await?
            .check(&label)?;
        Ok(())
    }

    async fn write_file(
        &self,
        host: &HostHandle,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> RemoteResult<()> {
        let script = atomic_write_script(path, mode);
        let cmd = self.ssh_command(host, &script)?;
        process::run(cmd, &script, Some(contents), self.command_timeout)
            .await?
            .check(&script)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "ssh"
    }
}

/// `gcloud compute ssh`, addressed by instance name and zone
///
/// Relies on the gcloud CLI for key distribution, so it works before any
/// key has been placed on the host.
#[derive(Debug, Clone)]
pub struct GcloudShell {
    project: Option<String>,
    user: Option<String>,
    command_timeout: Duration,
}

impl GcloudShell {
    pub fn new() -> Self {
        Self {
            project: None,
            user: None,
            command_timeout: Duration::from_secs(600),
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    fn target(&self, host: &HostHandle) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, host.name),
            None => host.name.clone(),
        }
    }

    fn base(&self, subcommand: &str, host: &HostHandle) -> Command {
        let mut cmd = Command::new("gcloud");
        cmd.arg("compute")
            .arg(subcommand)
            .arg(format!("--zone={}", host.zone))
            .arg("--quiet");
        if let Some(project) = &self.project {
            cmd.arg(format!("--project={}", project));
        }
        cmd
    }

    fn ssh_command(&self, host: &HostHandle, remote: &str) -> Command {
        let mut cmd = self.base("ssh", host);
        cmd.arg(self.target(host))
            .arg(format!("--command={}", remote))
            .arg("--")
            .arg("-o")
            .arg("BatchMode=yes");
        cmd
    }
}

impl Default for GcloudShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteShell for GcloudShell {
    async fn exec(&self, host: &HostHandle, command: &str) -> RemoteResult<CommandOutput> {
        process::run(
            self.ssh_command(host, command),
            command,
            None,
            self.command_timeout,
        )
        .await
    }

    async fn upload(&self, host: &HostHandle, local: &Path, remote: &str) -> RemoteResult<()> {
        let mut cmd = self.base("scp", host);
        cmd.arg(local)
            .arg(format!("{}:{}", self.target(host), remote));

        let label = format!("gcloud compute scp {} {}", local.display(), remote);
        debug!(host = %host.name, remote = %remote, "Uploading file");
        process::run(cmd, &label, None, self.command_timeout)
            .await?
            .check(&label)?;
        Ok(())
    }

    async fn write_file(
        &self,
        host: &HostHandle,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> RemoteResult<()> {
        let script = atomic_write_script(path, mode);
        process::run(
            self.ssh_command(host, &script),
            &script,
            Some(contents),
            self.command_timeout,
        )
        .await?
        .check(&script)?;
        Ok(())
    }

    fn name(&self) -> &str {
        "gcloud-ssh"
    }
}
