//! Local operator lock
//!
//! Mutating commands hold `<state_dir>/keel.lock` for their duration so two
//! terminals on one machine cannot drive the same environment at once. The
//! lock is advisory and local; it does not coordinate separate machines.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_FILE: &str = "keel.lock";

/// Held lock; released on drop
#[derive(Debug)]
pub struct OperatorLock {
    path: PathBuf,
}

impl OperatorLock {
    /// Take the lock for `command`, or fail naming the current holder.
    pub fn acquire(state_dir: &Path, command: &str) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("creating state directory {}", state_dir.display()))?;
        let path = state_dir.join(LOCK_FILE);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path).unwrap_or_default();
                let holder = holder.trim();
                bail!(
                    "{} is held by {}; if no other keel command is running, retry with --force-unlock",
                    path.display(),
                    if holder.is_empty() { "an unknown process" } else { holder }
                );
            }
            Err(e) => {
                return Err(e).with_context(|| format!("creating lock file {}", path.display()))
            }
        };

        writeln!(
            file,
            "pid {} running `keel {}` since {}",
            std::process::id(),
            command,
            Utc::now().to_rfc3339()
        )
        .with_context(|| format!("writing lock file {}", path.display()))?;
        debug!(path = %path.display(), "Lock acquired");
        Ok(Self { path })
    }

    /// Remove a stale lock. Returns whether one existed.
    pub fn force_unlock(state_dir: &Path) -> Result<bool> {
        let path = state_dir.join(LOCK_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                warn!(path = %path.display(), "Removed operator lock");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("removing lock file {}", path.display())),
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OperatorLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Could not release operator lock");
        }
    }
}
