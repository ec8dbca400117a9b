//! Remote directory layout

use keel_types::ReleaseId;
use serde::{Deserialize, Serialize};

/// Where releases, shared config and durable data live on the host
///
/// ```text
/// <root>/releases/<release>/   extracted source trees
/// <root>/current -> releases/<release>
/// <root>/shared/.env           injected configuration (0600)
/// <root>/data/                 volume mounted into the container
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteLayout {
    pub root: String,
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            root: "/opt/keel".to_string(),
        }
    }
}

impl RemoteLayout {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn releases_dir(&self) -> String {
        format!("{}/releases", self.root)
    }

    pub fn release_dir(&self, release: &ReleaseId) -> String {
        format!("{}/releases/{}", self.root, release)
    }

    pub fn staging_dir(&self, release: &ReleaseId) -> String {
        format!("{}/.staging-{}", self.root, release)
    }

    pub fn staging_archive(&self, release: &ReleaseId) -> String {
        format!("{}/.staging-{}.tar.gz", self.root, release)
    }

    /// The fixed live path.
    pub fn current(&self) -> String {
        format!("{}/current", self.root)
    }

    pub fn shared_dir(&self) -> String {
        format!("{}/shared", self.root)
    }

    pub fn env_file(&self) -> String {
        format!("{}/shared/.env", self.root)
    }

    pub fn data_dir(&self) -> String {
        format!("{}/data", self.root)
    }

    /// Directories bootstrap must create.
    pub fn base_dirs(&self) -> Vec<String> {
        vec![self.releases_dir(), self.shared_dir(), self.data_dir()]
    }
}
