//! Local shell

use crate::error::RemoteResult;
use crate::process::{self, CommandOutput};
use crate::shell::RemoteShell;
use async_trait::async_trait;
use keel_types::HostHandle;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Runs commands on the local machine with `sh -c`
///
/// The host handle is ignored. Useful when the orchestrator runs on the
/// target box itself, and for exercising remote layouts in tests.
#[derive(Debug, Clone)]
pub struct LocalShell {
    command_timeout: Duration,
}

impl LocalShell {
    pub fn new() -> Self {
        Self {
            command_timeout: Duration::from_secs(600),
        }
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteShell for LocalShell {
    async fn exec(&self, _host: &HostHandle, command: &str) -> RemoteResult<CommandOutput> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        process::run(cmd, command, None, self.command_timeout).await
    }

    async fn upload(&self, _host: &HostHandle, local: &Path, remote: &str) -> RemoteResult<()> {
        let remote = Path::new(remote);
        if let Some(parent) = remote.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, remote).await?;
        Ok(())
    }

    async fn write_file(
        &self,
        _host: &HostHandle,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> RemoteResult<()> {
        let target = Path::new(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = format!("{}.keel-tmp", path);
        tokio::fs::write(&tmp, contents).await?;
        set_mode(&tmp, mode).await?;
        tokio::fs::rename(&tmp, target).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

#[cfg(unix)]
async fn set_mode(path: &str, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &str, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostHandle {
        HostHandle {
            id: "local".into(),
            name: "localhost".into(),
            zone: "local".into(),
            external_ip: None,
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_exec_captures_output() {
        let shell = LocalShell::new();
        let out = shell.exec(&host(), "echo hello; exit 3").await.unwrap();
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.status, Some(3));
        assert!(shell.exec_checked(&host(), "exit 1").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_file_sets_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared/.env");
        let path = path.to_str().unwrap();

        let shell = LocalShell::new();
        shell
            .write_file(&host(), path, b"DRY_RUN=true\n", 0o600)
            .await
            .unwrap();

        let meta = std::fs::metadata(path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(std::fs::read_to_string(path).unwrap(), "DRY_RUN=true\n");
        assert!(shell.path_exists(&host(), path).await.unwrap());
    }
}
