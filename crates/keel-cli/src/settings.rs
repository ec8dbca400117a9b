//! Orchestrator settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `KEEL_`-prefixed environment variables. Nested keys use a
//! double underscore, e.g. `KEEL_HOST__ZONE=europe-west1-b`.

use keel_container::ContainerConfig;
use keel_control::{PipelineConfig, PromotionPolicy};
use keel_health::HealthConfig;
use keel_host::ProvisionerConfig;
use keel_sync::{RemoteLayout, SyncConfig};
use keel_types::HostSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything the operator CLI needs to reach and manage one environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Local directory for the stage record and the operator lock
    pub state_dir: PathBuf,

    /// Env file holding the deployment configuration (secrets stay local)
    pub env_file: Option<PathBuf>,

    pub host: HostSpec,
    pub remote: RemoteSettings,
    pub provisioner: ProvisionerConfig,
    pub layout: RemoteLayout,
    pub sync: SyncConfig,
    pub container: ContainerConfig,
    pub health: HealthConfig,
    pub policy: PromotionPolicy,
    pub pipeline: PipelineConfig,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".keel"),
            env_file: Some(PathBuf::from(".env")),
            host: HostSpec::default(),
            remote: RemoteSettings::default(),
            provisioner: ProvisionerConfig::default(),
            layout: RemoteLayout::default(),
            sync: SyncConfig::default(),
            container: ContainerConfig::default(),
            health: HealthConfig::default(),
            policy: PromotionPolicy::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// How commands reach the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// `gcloud compute ssh` by instance name
    Gcloud,
    /// OpenSSH against the external address
    Ssh,
}

/// Remote channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub channel: Channel,

    /// Cloud project; the gcloud default when unset
    pub project: Option<String>,

    /// Remote login user
    pub user: Option<String>,

    /// Private key for the ssh channel
    pub identity_file: Option<PathBuf>,

    pub port: u16,

    /// Run docker through sudo
    pub sudo: bool,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            channel: Channel::Gcloud,
            project: None,
            user: None,
            identity_file: None,
            port: 22,
            sudo: true,
        }
    }
}

impl OrchestratorSettings {
    /// Load settings from `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::load_with(path, env_source())
    }

    /// Load settings with an explicit environment layer.
    pub fn load_with(
        path: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder.add_source(env).build()?.try_deserialize()
    }

    /// File holding this environment's stage record.
    pub fn stage_file(&self) -> PathBuf {
        self.state_dir.join(format!("{}.stage.json", self.host.name))
    }

    /// Commented TOML template with every default spelled out.
    pub fn template() -> Result<String, toml::ser::Error> {
        let body = toml::to_string_pretty(&Self::default())?;
        Ok(format!(
            "# keel orchestrator settings\n\
             # Every key can be overridden with KEEL_<SECTION>__<KEY>, e.g. KEEL_HOST__ZONE.\n\
             # Secrets never go here; they live in the env file named below.\n\n{}",
            body
        ))
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix("KEEL")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_control::PromotionGate;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env_source().source(Some(map))
    }

    #[test]
    fn test_defaults_without_sources() {
        let settings = OrchestratorSettings::load_with(None, env(&[])).unwrap();
        assert_eq!(settings.host.name, "trading-bot");
        assert_eq!(settings.container.name, "bot");
        assert_eq!(settings.remote.channel, Channel::Gcloud);
        assert_eq!(settings.policy.gate, PromotionGate::Advisory);
        assert_eq!(settings.stage_file(), PathBuf::from(".keel/trading-bot.stage.json"));
    }

    #[test]
    fn test_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.toml");
        std::fs::write(
            &path,
            "[host]\nzone = \"europe-west1-b\"\n\n[remote]\nchannel = \"ssh\"\nuser = \"deploy\"\n\n[policy]\ngate = \"require_healthy\"\n",
        )
        .unwrap();

        let settings = OrchestratorSettings::load_with(
            Some(&path),
            env(&[("KEEL_HOST__ZONE", "us-central1-a"), ("KEEL_STATE_DIR", "/var/lib/keel")]),
        )
        .unwrap();

        assert_eq!(settings.host.zone, "us-central1-a");
        assert_eq!(settings.host.name, "trading-bot");
        assert_eq!(settings.remote.channel, Channel::Ssh);
        assert_eq!(settings.remote.user.as_deref(), Some("deploy"));
        assert_eq!(settings.policy.gate, PromotionGate::RequireHealthy);
        assert_eq!(settings.state_dir, PathBuf::from("/var/lib/keel"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(OrchestratorSettings::load_with(Some(&missing), env(&[])).is_err());
    }

    #[test]
    fn test_template_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.toml");
        std::fs::write(&path, OrchestratorSettings::template().unwrap()).unwrap();

        let settings = OrchestratorSettings::load_with(Some(&path), env(&[])).unwrap();
        assert_eq!(settings.layout, RemoteLayout::default());
        assert_eq!(settings.health.liveness_interval_secs, 60);
    }
}
