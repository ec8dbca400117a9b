//! The remote shell trait

use crate::error::RemoteResult;
use crate::process::CommandOutput;
use crate::quote::shell_quote;
use async_trait::async_trait;
use keel_types::HostHandle;
use std::path::Path;

/// Secure remote-execution channel to a provisioned host
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a shell command on the host and capture its output.
    ///
    /// A non-zero exit is returned as output, not as an error; use
    /// [`RemoteShell::exec_checked`] to treat it as a failure.
    async fn exec(&self, host: &HostHandle, command: &str) -> RemoteResult<CommandOutput>;

    /// Copy a local file to a remote path.
    async fn upload(&self, host: &HostHandle, local: &Path, remote: &str) -> RemoteResult<()>;

    /// Get the shell name
    fn name(&self) -> &str;

    /// Run a command and fail on non-zero exit.
    async fn exec_checked(&self, host: &HostHandle, command: &str) -> RemoteResult<CommandOutput> {
        self.exec(host, command).await?.check(command)
    }

    /// Atomically write a small file on the host with the given mode.
    ///
    /// The content goes through a temp file that is renamed into place, so a
    /// reader never sees a partial file.
    async fn write_file(
        &self,
        host: &HostHandle,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> RemoteResult<()>;

    /// Whether a remote path exists.
    async fn path_exists(&self, host: &HostHandle, path: &str) -> RemoteResult<bool> {
        let out = self
            .exec(host, &format!("test -e {}", shell_quote(path)))
            .await?;
        Ok(out.success())
    }
}

/// Shell snippet that writes stdin to `path` through a temp file.
pub(crate) fn atomic_write_script(path: &str, mode: u32) -> String {
    let tmp = format!("{}.keel-tmp", path);
    format!(
        "umask 077 && mkdir -p \"$(dirname {path})\" && cat > {tmp} && chmod {mode:o} {tmp} && mv -f {tmp} {path}",
        path = shell_quote(path),
        tmp = shell_quote(&tmp),
        mode = mode,
    )
}
