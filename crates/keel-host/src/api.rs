//! Compute provider API seam

use crate::error::ProvisioningResult;
use async_trait::async_trait;
use keel_types::{HostHandle, HostSpec};
use serde::{Deserialize, Serialize};

/// An ingress firewall rule, upserted by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub name: String,
    /// Allowed protocol and port, e.g. `tcp:22`
    pub allow: String,
    pub target_tags: Vec<String>,
    pub source_ranges: Vec<String>,
}

impl FirewallRule {
    /// SSH ingress for the given tags.
    pub fn ssh(name: impl Into<String>, target_tags: Vec<String>, source_ranges: Vec<String>) -> Self {
        Self {
            name: name.into(),
            allow: "tcp:22".to_string(),
            target_tags,
            source_ranges,
        }
    }
}

/// Operations on the compute provider
///
/// Implementations report provider failures as classified
/// [`ProvisioningError`](crate::ProvisioningError)s. `describe_*` calls map
/// "not found" to `Ok(None)`.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Look up an instance by name.
    async fn describe_instance(&self, name: &str, zone: &str)
        -> ProvisioningResult<Option<HostHandle>>;

    /// Create an instance, optionally bound to an external address.
    async fn create_instance(
        &self,
        spec: &HostSpec,
        address: Option<&str>,
    ) -> ProvisioningResult<HostHandle>;

    /// Look up a reserved address by name, returning its IP.
    async fn describe_address(&self, name: &str, region: &str) -> ProvisioningResult<Option<String>>;

    /// Reserve a static address, returning its IP.
    async fn reserve_address(&self, name: &str, region: &str) -> ProvisioningResult<String>;

    /// Bind an external address to an existing instance.
    async fn attach_address(&self, host: &HostHandle, ip: &str) -> ProvisioningResult<HostHandle>;

    /// Add network tags to an instance. Existing tags are kept.
    async fn add_tags(&self, host: &HostHandle, tags: &[String]) -> ProvisioningResult<()>;

    /// Create the firewall rule unless one with the same name exists.
    /// Returns whether it was created.
    async fn ensure_firewall_rule(&self, rule: &FirewallRule) -> ProvisioningResult<bool>;

    /// Get the API name
    fn name(&self) -> &str;
}
