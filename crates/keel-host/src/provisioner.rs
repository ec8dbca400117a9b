//! Host Provisioner - idempotent host creation and runtime bootstrap

use crate::api::{ComputeApi, FirewallRule};
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::retry::RetryConfig;
use keel_remote::{shell_quote, RemoteShell};
use keel_types::{EventSource, HostHandle, HostSpec, KeelEvent, KeelEventEnvelope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Provisioner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Retry policy for transient API failures
    pub retry: RetryConfig,

    /// Name of the SSH ingress firewall rule
    pub ssh_rule_name: String,

    /// Source ranges allowed to reach SSH
    pub ssh_source_ranges: Vec<String>,

    /// Command that installs and enables the container runtime
    pub runtime_install_command: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            ssh_rule_name: "keel-allow-ssh".to_string(),
            ssh_source_ranges: vec!["0.0.0.0/0".to_string()],
            runtime_install_command:
                "curl -fsSL https://get.docker.com | sudo sh && sudo systemctl enable --now docker && sudo usermod -aG docker \"$(id -un)\""
                    .to_string(),
        }
    }
}

/// What `bootstrap_runtime` found and did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutcome {
    /// Reported runtime version
    pub runtime_version: String,
    /// Whether the runtime had to be installed
    pub installed: bool,
}

/// Idempotent host provisioner
pub struct HostProvisioner {
    api: Arc<dyn ComputeApi>,
    config: ProvisionerConfig,
    event_tx: broadcast::Sender<KeelEventEnvelope>,
}

impl HostProvisioner {
    pub fn new(api: Arc<dyn ComputeApi>, config: ProvisionerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            api,
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

    /// Ensure a host matching `spec` exists and return its handle.
    ///
    /// A host that already exists under `spec.name` is returned as-is, except
    /// that a missing reserved address is attached and missing firewall tags
    /// are added. Nothing is ever removed.
    #[instrument(skip(self, spec), fields(host = %spec.name, zone = %spec.zone))]
    pub async fn ensure_host(&self, spec: &HostSpec) -> ProvisioningResult<HostHandle> {
        spec.validate()?;
        let retry = &self.config.retry;

        // 1. Reserved address (upsert by name)
        let address = match &spec.reserved_address {
            Some(name) => Some(self.ensure_address(name, spec.region()).await?),
            None => None,
        };

        // 2. Instance (upsert by name)
        let existing = retry
            .run("describe instance", || {
                self.api.describe_instance(&spec.name, &spec.zone)
            })
            .await?;

        let (mut host, created) = match existing {
            Some(host) => {
                info!(host_id = %host.id, "Host already exists");
                (host, false)
            }
            None => match retry
                .run("create instance", || {
                    self.api.create_instance(spec, address.as_deref())
                })
                .await
            {
                Ok(host) => {
                    info!(host_id = %host.id, "Host created");
                    (host, true)
                }
                Err(ProvisioningError::Conflict(msg)) => {
                    // Created concurrently or by an earlier interrupted run.
                    warn!(reason = %msg, "Create reported conflict, using existing host");
                    let host = retry
                        .run("describe instance", || {
                            self.api.describe_instance(&spec.name, &spec.zone)
                        })
                        .await?
                        .ok_or(ProvisioningError::Conflict(msg))?;
                    (host, false)
                }
                Err(e) => return Err(e),
            },
        };

        // 3. Attach the reserved address if the host lacks it
        if let Some(ip) = &address {
            if host.external_ip.as_deref() != Some(ip.as_str()) {
                info!(address = %ip, "Attaching reserved address");
                host = retry
                    .run("attach address", || self.api.attach_address(&host, ip))
                    .await?;
                self.emit_event(
                    KeelEvent::AddressAttached {
                        host: host.name.clone(),
                        address: ip.clone(),
                    },
                    &host.name,
                );
            }
        }

        // 4. Add missing firewall tags
        let missing: Vec<String> = spec
            .firewall_tags
            .iter()
            .filter(|t| !host.tags.contains(t))
            .cloned()
            .collect();
        if !missing.is_empty() {
            info!(tags = ?missing, "Adding missing firewall tags");
            retry
                .run("add tags", || self.api.add_tags(&host, &missing))
                .await?;
            host.tags.extend(missing);
        }

        // 5. SSH ingress rule for those tags
        if !spec.firewall_tags.is_empty() {
            let rule = FirewallRule::ssh(
                self.config.ssh_rule_name.clone(),
                spec.firewall_tags.clone(),
                self.config.ssh_source_ranges.clone(),
            );
            let created_rule = retry
                .run("ensure firewall rule", || self.api.ensure_firewall_rule(&rule))
                .await?;
            if created_rule {
                info!(rule = %rule.name, "Firewall rule created");
            }
        }

        self.emit_event(
            KeelEvent::HostEnsured {
                host: host.name.clone(),
                created,
            },
            &host.name,
        );

        Ok(host)
    }

    async fn ensure_address(&self, name: &str, region: &str) -> ProvisioningResult<String> {
        let retry = &self.config.retry;
        if let Some(ip) = retry
            .run("describe address", || self.api.describe_address(name, region))
            .await?
        {
            return Ok(ip);
        }

        match retry
            .run("reserve address", || self.api.reserve_address(name, region))
            .await
        {
            Ok(ip) => Ok(ip),
            Err(ProvisioningError::Conflict(msg)) => retry
                .run("describe address", || self.api.describe_address(name, region))
                .await?
                .ok_or(ProvisioningError::Conflict(msg)),
            Err(e) => Err(e),
        }
    }

    /// Make sure the container runtime is installed and the base directories exist.
    ///
    /// Idempotent: a host that already has the runtime is left alone.
    #[instrument(skip(self, shell, host, directories), fields(host = %host.name))]
    pub async fn bootstrap_runtime(
        &self,
        shell: &dyn RemoteShell,
        host: &HostHandle,
        directories: &[String],
    ) -> ProvisioningResult<BootstrapOutcome> {
        let probe = shell.exec(host, "docker --version").await?;

        let (runtime_version, installed) = if probe.success() {
            (probe.stdout.trim().to_string(), false)
        } else {
            info!("Container runtime missing, installing");
            shell
                .exec_checked(host, &self.config.runtime_install_command)
                .await?;
            let version = shell.exec_checked(host, "docker --version").await?;
            (version.stdout.trim().to_string(), true)
        };

        if !directories.is_empty() {
            let dirs: Vec<String> = directories.iter().map(|d| shell_quote(d)).collect();
            let dirs = dirs.join(" ");
            shell
                .exec_checked(
                    host,
                    &format!(
                        "sudo mkdir -p {dirs} && sudo chown \"$(id -un)\" {dirs}",
                        dirs = dirs
                    ),
                )
                .await?;
        }

        info!(runtime = %runtime_version, installed, "Runtime ready");
        self.emit_event(
            KeelEvent::RuntimeBootstrapped {
                host: host.name.clone(),
                installed,
            },
            &host.name,
        );

        Ok(BootstrapOutcome {
            runtime_version,
            installed,
        })
    }

    fn emit_event(&self, event: KeelEvent, environment: &str) {
        let envelope = KeelEventEnvelope::new(event, EventSource::Host, environment);
        let _ = self.event_tx.send(envelope);
    }
}
