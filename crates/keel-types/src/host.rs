//! Remote compute host description

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What compute host to ensure for an environment.
///
/// Immutable once provisioned, except that a reserved address may be attached
/// later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    /// Stable name; provisioning is an upsert keyed by it
    pub name: String,

    /// Zone, e.g. `asia-southeast1-b`
    pub zone: String,

    /// Machine profile, e.g. `e2-small`
    #[serde(default = "default_machine_type")]
    pub machine_type: String,

    /// Boot image reference
    #[serde(default)]
    pub image: BootImage,

    /// Boot disk
    #[serde(default)]
    pub disk: DiskSpec,

    /// Name of a static external address to reserve and attach
    #[serde(default)]
    pub reserved_address: Option<String>,

    /// Network tags the firewall rules target
    #[serde(default = "default_tags")]
    pub firewall_tags: Vec<String>,
}

/// Boot image reference (family + project)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootImage {
    pub family: String,
    pub project: String,
}

impl Default for BootImage {
    fn default() -> Self {
        Self {
            family: "debian-12".to_string(),
            project: "debian-cloud".to_string(),
        }
    }
}

/// Boot disk sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub size_gb: u32,
    pub disk_type: String,
}

impl Default for DiskSpec {
    fn default() -> Self {
        Self {
            size_gb: 20,
            disk_type: "pd-balanced".to_string(),
        }
    }
}

fn default_machine_type() -> String {
    "e2-small".to_string()
}

fn default_tags() -> Vec<String> {
    vec!["keel-ssh".to_string()]
}

impl Default for HostSpec {
    fn default() -> Self {
        Self {
            name: "trading-bot".to_string(),
            zone: "asia-southeast1-b".to_string(),
            machine_type: default_machine_type(),
            image: BootImage::default(),
            disk: DiskSpec::default(),
            reserved_address: Some("trading-bot-ip".to_string()),
            firewall_tags: default_tags(),
        }
    }
}

/// Host spec validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecValidationError {
    #[error("host name is empty")]
    EmptyName,

    #[error("invalid host name '{0}': use lowercase letters, digits and '-', starting with a letter")]
    InvalidName(String),

    #[error("invalid zone '{0}': expected <region>-<letter>")]
    InvalidZone(String),

    #[error("disk size must be at least 10 GB, got {0}")]
    DiskTooSmall(u32),
}

impl HostSpec {
    /// Region derived from the zone (`asia-southeast1-b` -> `asia-southeast1`).
    pub fn region(&self) -> &str {
        self.zone
            .rsplit_once('-')
            .map(|(region, _)| region)
            .unwrap_or(&self.zone)
    }

    pub fn validate(&self) -> Result<(), SpecValidationError> {
        if self.name.is_empty() {
            return Err(SpecValidationError::EmptyName);
        }
        let valid_name = self
            .name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !self.name.ends_with('-')
            && self.name.len() <= 63;
        if !valid_name {
            return Err(SpecValidationError::InvalidName(self.name.clone()));
        }
        match self.zone.rsplit_once('-') {
            Some((region, suffix)) if !region.is_empty() && suffix.len() == 1 => {}
            _ => return Err(SpecValidationError::InvalidZone(self.zone.clone())),
        }
        if self.disk.size_gb < 10 {
            return Err(SpecValidationError::DiskTooSmall(self.disk.size_gb));
        }
        Ok(())
    }
}

/// Handle to a provisioned host.
///
/// Two handles refer to the same underlying host when their `id` matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostHandle {
    /// Provider-assigned instance id
    pub id: String,
    pub name: String,
    pub zone: String,
    /// External address, once one is attached
    pub external_ip: Option<String>,
    pub tags: Vec<String>,
}

impl HostHandle {
    pub fn same_host(&self, other: &HostHandle) -> bool {
        self.id == other.id
    }
}
