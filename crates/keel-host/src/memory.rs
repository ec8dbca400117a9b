//! In-memory compute API for tests and dry runs

use crate::api::{ComputeApi, FirewallRule};
use crate::error::{ProvisioningError, ProvisioningResult};
use async_trait::async_trait;
use dashmap::DashMap;
use keel_types::{HostHandle, HostSpec};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Operation selector for injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOp {
    DescribeInstance,
    CreateInstance,
    DescribeAddress,
    ReserveAddress,
    AttachAddress,
    AddTags,
    EnsureFirewallRule,
}

/// In-memory compute API
///
/// Behaves like the provider: names are unique, creates of an existing
/// name fail with `Conflict`. Failures can be queued per operation.
#[derive(Default)]
pub struct InMemoryComputeApi {
    instances: DashMap<String, HostHandle>,
    addresses: DashMap<String, String>,
    firewall_rules: DashMap<String, FirewallRule>,
    failures: Mutex<VecDeque<(ApiOp, ProvisioningError)>>,
    next_id: AtomicU64,
    create_calls: AtomicU64,
    stale_describes: AtomicU64,
}

impl InMemoryComputeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op` with `error`.
    pub async fn fail_next(&self, op: ApiOp, error: ProvisioningError) {
        self.failures.lock().await.push_back((op, error));
    }

    /// Answer the next `n` instance lookups with "absent", like a lagging
    /// provider index.
    pub fn stale_describes(&self, n: u64) {
        self.stale_describes.store(n, Ordering::SeqCst);
    }

    /// Number of instances known to the provider.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Number of create calls received (including failed ones).
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn instance(&self, name: &str) -> Option<HostHandle> {
        self.instances.get(name).map(|h| h.clone())
    }

    pub fn firewall_rule(&self, name: &str) -> Option<FirewallRule> {
        self.firewall_rules.get(name).map(|r| r.clone())
    }

    /// Seed an existing instance, as if created outside this process.
    pub fn insert_instance(&self, host: HostHandle) {
        self.instances.insert(host.name.clone(), host);
    }

    async fn injected(&self, op: ApiOp) -> ProvisioningResult<()> {
        let mut failures = self.failures.lock().await;
        if let Some(idx) = failures.iter().position(|(o, _)| *o == op) {
            if let Some((_, err)) = failures.remove(idx) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn next_ip(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("203.0.113.{}", n % 254 + 1)
    }
}

#[async_trait]
impl ComputeApi for InMemoryComputeApi {
    async fn describe_instance(
        &self,
        name: &str,
        _zone: &str,
    ) -> ProvisioningResult<Option<HostHandle>> {
        self.injected(ApiOp::DescribeInstance).await?;
        let stale = self
            .stale_describes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        Ok(self.instance(name))
    }

    async fn create_instance(
        &self,
        spec: &HostSpec,
        address: Option<&str>,
    ) -> ProvisioningResult<HostHandle> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.injected(ApiOp::CreateInstance).await?;

        if self.instances.contains_key(&spec.name) {
            return Err(ProvisioningError::Conflict(format!(
                "The resource 'instances/{}' already exists",
                spec.name
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let host = HostHandle {
            id: format!("{}", 1_000_000 + id),
            name: spec.name.clone(),
            zone: spec.zone.clone(),
            external_ip: Some(address.map(String::from).unwrap_or_else(|| self.next_ip())),
            tags: spec.firewall_tags.clone(),
        };
        self.instances.insert(spec.name.clone(), host.clone());
        Ok(host)
    }

    async fn describe_address(&self, name: &str, _region: &str) -> ProvisioningResult<Option<String>> {
        self.injected(ApiOp::DescribeAddress).await?;
        Ok(self.addresses.get(name).map(|a| a.clone()))
    }

    async fn reserve_address(&self, name: &str, _region: &str) -> ProvisioningResult<String> {
        self.injected(ApiOp::ReserveAddress).await?;
        if self.addresses.contains_key(name) {
            return Err(ProvisioningError::Conflict(format!(
                "The resource 'addresses/{}' already exists",
                name
            )));
        }
        let ip = self.next_ip();
        self.addresses.insert(name.to_string(), ip.clone());
        Ok(ip)
    }

    async fn attach_address(&self, host: &HostHandle, ip: &str) -> ProvisioningResult<HostHandle> {
        self.injected(ApiOp::AttachAddress).await?;
        let mut entry = self
            .instances
            .get_mut(&host.name)
            .ok_or_else(|| ProvisioningError::NotFound(host.name.clone()))?;
        entry.external_ip = Some(ip.to_string());
        Ok(entry.clone())
    }

    async fn add_tags(&self, host: &HostHandle, tags: &[String]) -> ProvisioningResult<()> {
        self.injected(ApiOp::AddTags).await?;
        let mut entry = self
            .instances
            .get_mut(&host.name)
            .ok_or_else(|| ProvisioningError::NotFound(host.name.clone()))?;
        for tag in tags {
            if !entry.tags.contains(tag) {
                entry.tags.push(tag.clone());
            }
        }
        Ok(())
    }

    async fn ensure_firewall_rule(&self, rule: &FirewallRule) -> ProvisioningResult<bool> {
        self.injected(ApiOp::EnsureFirewallRule).await?;
        if self.firewall_rules.contains_key(&rule.name) {
            return Ok(false);
        }
        self.firewall_rules.insert(rule.name.clone(), rule.clone());
        Ok(true)
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
