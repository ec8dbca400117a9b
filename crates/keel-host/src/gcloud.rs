//! `gcloud` CLI implementation of [`ComputeApi`]

use crate::api::{ComputeApi, FirewallRule};
use crate::error::{ProvisioningError, ProvisioningResult};
use async_trait::async_trait;
use keel_remote::process;
use keel_types::{HostHandle, HostSpec};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

const ACCESS_CONFIG_NAME: &str = "external-nat";

/// Compute API backed by the `gcloud` CLI
#[derive(Debug, Clone)]
pub struct GcloudComputeApi {
    project: Option<String>,
    timeout: Duration,
}

impl GcloudComputeApi {
    pub fn new(project: Option<String>) -> Self {
        Self {
            project,
            timeout: Duration::from_secs(300),
        }
    }

    /// Run `gcloud compute <args>` and return stdout, classifying failures.
    async fn gcloud(&self, args: &[String]) -> ProvisioningResult<String> {
        let mut cmd = Command::new("gcloud");
        cmd.arg("compute").args(args).arg("--quiet");
        if let Some(project) = &self.project {
            cmd.arg(format!("--project={}", project));
        }

        let label = format!("gcloud compute {}", args.join(" "));
        let output = process::run(cmd, &label, None, self.timeout).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(ProvisioningError::classify(&output.stderr))
        }
    }

    /// Like [`Self::gcloud`], mapping "not found" to `None`.
    async fn gcloud_optional(&self, args: &[String]) -> ProvisioningResult<Option<String>> {
        match self.gcloud(args).await {
            Ok(out) => Ok(Some(out)),
            Err(ProvisioningError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// Subset of the instance resource we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceResource {
    id: String,
    name: String,
    zone: String,
    #[serde(default)]
    network_interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    tags: Tags,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterface {
    #[serde(default)]
    access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessConfig {
    #[serde(rename = "natIP")]
    nat_ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Tags {
    #[serde(default)]
    items: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AddressResource {
    address: String,
}

impl From<InstanceResource> for HostHandle {
    fn from(r: InstanceResource) -> Self {
        let external_ip = r
            .network_interfaces
            .iter()
            .flat_map(|n| n.access_configs.iter())
            .find_map(|a| a.nat_ip.clone());
        // zone comes back as a resource URL
        let zone = r.zone.rsplit('/').next().unwrap_or(&r.zone).to_string();
        HostHandle {
            id: r.id,
            name: r.name,
            zone,
            external_ip,
            tags: r.tags.items,
        }
    }
}

/// Parse `describe` output (an object) or `create` output (a list).
fn parse_instance(json: &str) -> ProvisioningResult<HostHandle> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ProvisioningError::Parse(e.to_string()))?;
    let value = match value {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.remove(0),
        other => other,
    };
    let resource: InstanceResource =
        serde_json::from_value(value).map_err(|e| ProvisioningError::Parse(e.to_string()))?;
    Ok(resource.into())
}

fn parse_address(json: &str) -> ProvisioningResult<String> {
    let resource: AddressResource =
        serde_json::from_str(json).map_err(|e| ProvisioningError::Parse(e.to_string()))?;
    Ok(resource.address)
}

#[async_trait]
impl ComputeApi for GcloudComputeApi {
    async fn describe_instance(
        &self,
        name: &str,
        zone: &str,
    ) -> ProvisioningResult<Option<HostHandle>> {
        let out = self
            .gcloud_optional(&args(&[
                "instances",
                "describe",
                name,
                &format!("--zone={}", zone),
                "--format=json",
            ]))
            .await?;
        out.as_deref().map(parse_instance).transpose()
    }

    async fn create_instance(
        &self,
        spec: &HostSpec,
        address: Option<&str>,
    ) -> ProvisioningResult<HostHandle> {
        let mut a = args(&["instances", "create", &spec.name]);
        a.push(format!("--zone={}", spec.zone));
        a.push(format!("--machine-type={}", spec.machine_type));
        a.push(format!("--image-family={}", spec.image.family));
        a.push(format!("--image-project={}", spec.image.project));
        a.push(format!("--boot-disk-size={}GB", spec.disk.size_gb));
        a.push(format!("--boot-disk-type={}", spec.disk.disk_type));
        if !spec.firewall_tags.is_empty() {
            a.push(format!("--tags={}", spec.firewall_tags.join(",")));
        }
        if let Some(ip) = address {
            a.push(format!("--address={}", ip));
        }
        a.push("--format=json".to_string());

        info!(host = %spec.name, zone = %spec.zone, machine_type = %spec.machine_type, "Creating instance");
        let out = self.gcloud(&a).await?;
        parse_instance(&out)
    }

    async fn describe_address(&self, name: &str, region: &str) -> ProvisioningResult<Option<String>> {
        let out = self
            .gcloud_optional(&args(&[
                "addresses",
                "describe",
                name,
                &format!("--region={}", region),
                "--format=json",
            ]))
            .await?;
        out.as_deref().map(parse_address).transpose()
    }

    async fn reserve_address(&self, name: &str, region: &str) -> ProvisioningResult<String> {
        info!(address = %name, region = %region, "Reserving static address");
        self.gcloud(&args(&[
            "addresses",
            "create",
            name,
            &format!("--region={}", region),
        ]))
        .await?;
        self.describe_address(name, region)
            .await?
            .ok_or_else(|| ProvisioningError::Api(format!("address {} missing after reserve", name)))
    }

    async fn attach_address(&self, host: &HostHandle, ip: &str) -> ProvisioningResult<HostHandle> {
        let zone = format!("--zone={}", host.zone);
        let config_name = format!("--access-config-name={}", ACCESS_CONFIG_NAME);

        // An ephemeral access config must go before a static one can bind.
        if host.external_ip.is_some() {
            match self
                .gcloud(&args(&[
                    "instances",
                    "delete-access-config",
                    &host.name,
                    &zone,
                    &config_name,
                ]))
                .await
            {
                Ok(_) | Err(ProvisioningError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        self.gcloud(&args(&[
            "instances",
            "add-access-config",
            &host.name,
            &zone,
            &config_name,
            &format!("--address={}", ip),
        ]))
        .await?;

        self.describe_instance(&host.name, &host.zone)
            .await?
            .ok_or_else(|| ProvisioningError::NotFound(host.name.clone()))
    }

    async fn add_tags(&self, host: &HostHandle, tags: &[String]) -> ProvisioningResult<()> {
        debug!(host = %host.name, tags = ?tags, "Adding network tags");
        self.gcloud(&args(&[
            "instances",
            "add-tags",
            &host.name,
            &format!("--zone={}", host.zone),
            &format!("--tags={}", tags.join(",")),
        ]))
        .await?;
        Ok(())
    }

    async fn ensure_firewall_rule(&self, rule: &FirewallRule) -> ProvisioningResult<bool> {
        let existing = self
            .gcloud_optional(&args(&["firewall-rules", "describe", &rule.name, "--format=json"]))
            .await?;
        if existing.is_some() {
            return Ok(false);
        }

        info!(rule = %rule.name, allow = %rule.allow, "Creating firewall rule");
        let result = self
            .gcloud(&args(&[
                "firewall-rules",
                "create",
                &rule.name,
                "--direction=INGRESS",
                &format!("--allow={}", rule.allow),
                &format!("--target-tags={}", rule.target_tags.join(",")),
                &format!("--source-ranges={}", rule.source_ranges.join(",")),
            ]))
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(ProvisioningError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "gcloud"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE: &str = r#"{
        "id": "4417029384",
        "name": "trading-bot",
        "zone": "https://www.googleapis.com/compute/v1/projects/p1/zones/asia-southeast1-b",
        "networkInterfaces": [
            {"accessConfigs": [{"name": "external-nat", "natIP": "34.87.1.2"}]}
        ],
        "tags": {"items": ["keel-ssh"], "fingerprint": "abc"}
    }"#;

    #[test]
    fn test_parse_describe() {
        let host = parse_instance(DESCRIBE).unwrap();
        assert_eq!(host.id, "4417029384");
        assert_eq!(host.zone, "asia-southeast1-b");
        assert_eq!(host.external_ip.as_deref(), Some("34.87.1.2"));
        assert_eq!(host.tags, vec!["keel-ssh".to_string()]);
    }

    #[test]
    fn test_parse_create_list() {
        let list = format!("[{}]", DESCRIBE);
        assert_eq!(parse_instance(&list).unwrap().name, "trading-bot");
    }

    #[test]
    fn test_parse_without_address_or_tags() {
        let json = r#"{"id": "1", "name": "b", "zone": "z", "networkInterfaces": [{}]}"#;
        let host = parse_instance(json).unwrap();
        assert!(host.external_ip.is_none());
        assert!(host.tags.is_empty());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_instance("not json"),
            Err(ProvisioningError::Parse(_))
        ));
        assert_eq!(parse_address(r#"{"address": "34.87.1.2"}"#).unwrap(), "34.87.1.2");
    }
}
