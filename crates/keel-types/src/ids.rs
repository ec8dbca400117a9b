//! Strongly-typed identifiers for Keel entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the single container slot on a host (for example `bot`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceName(String);

impl InstanceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Content-addressed identifier of one uploaded source tree.
///
/// Derived from the blake3 digest of the packed artifact, so re-pushing an
/// identical tree yields the same release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    /// Number of hex characters kept from the digest.
    pub const LEN: usize = 12;

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a release id from a full hex digest.
    pub fn from_digest(hex: &str) -> Self {
        Self(hex.chars().take(Self::LEN).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a built container image (`repository:tag`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Image for a given release of a repository.
    pub fn for_release(repository: impl Into<String>, release: &ReleaseId) -> Self {
        Self::new(repository, release.as_str())
    }

    /// Parse `repository:tag`; a missing tag means `latest`.
    pub fn parse(s: &str) -> Self {
        // A colon before the last slash belongs to a registry port, not a tag
        match s.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') && !repo.is_empty() => Self::new(repo, tag),
            _ => Self::new(s, "latest"),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
