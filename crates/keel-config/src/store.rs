//! ConfigStore - builds a validated `DeploymentConfig` from key/value sources

use crate::env_file;
use crate::error::{ConfigError, ConfigIssues, ConfigResult};
use keel_types::{
    keys, DeploymentConfig, ExchangeCredentials, LogLevel, NotificationIdentity, RunMode, Secret,
};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Source of configuration key/values.
///
/// Holds only the keys of the configuration surface; unrelated variables of
/// the process environment are dropped on construction.
#[derive(Clone, Default)]
pub struct ConfigStore {
    values: HashMap<String, String>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut present: Vec<_> = self.values.keys().collect();
        present.sort();
        f.debug_struct("ConfigStore")
            .field("present", &present)
            .finish()
    }
}

fn known_keys() -> [&'static str; 8] {
    [
        keys::EXCHANGE_API_KEY,
        keys::EXCHANGE_API_SECRET,
        keys::EXCHANGE_TESTNET,
        keys::NOTIFY_TOKEN,
        keys::NOTIFY_CHAT_ID,
        keys::DRY_RUN,
        keys::STORAGE_PATH,
        keys::LOG_LEVEL,
    ]
}

impl ConfigStore {
    /// Build from an explicit map.
    pub fn from_map<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let known = known_keys();
        let values = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| known.contains(&k.as_str()))
            .collect();
        Self { values }
    }

    /// Build from the current process environment.
    pub fn from_env() -> Self {
        Self::from_map(std::env::vars())
    }

    /// Build from an env file.
    pub fn from_env_file(path: &Path) -> ConfigResult<Self> {
        let vars = env_file::read(path)?;
        debug!(path = %path.display(), keys = vars.len(), "Read env file");
        Ok(Self::from_map(vars))
    }

    /// Env file (if given and present) overridden by the process environment.
    pub fn layered(env_file: Option<&Path>) -> ConfigResult<Self> {
        let mut store = match env_file {
            Some(path) if path.exists() => Self::from_env_file(path)?,
            Some(path) => {
                warn!(path = %path.display(), "Env file not found, using process environment only");
                Self::default()
            }
            None => Self::default(),
        };
        store.merge(Self::from_env());
        Ok(store)
    }

    /// Overlay another store; its non-empty values win.
    pub fn merge(&mut self, other: ConfigStore) {
        for (key, value) in other.values {
            if !value.is_empty() {
                self.values.insert(key, value);
            }
        }
    }

    /// Raw value lookup. Empty strings count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Validate and build the configuration.
    ///
    /// Reports every missing key and every invalid value at once.
    pub fn load(&self) -> ConfigResult<DeploymentConfig> {
        let mut issues = ConfigIssues::default();

        for key in keys::REQUIRED {
            if self.get(key).is_none() {
                issues.missing.push((*key).to_string());
            }
        }

        for (key, value) in &self.values {
            if value.contains('\n') || value.contains('\r') {
                issues
                    .invalid
                    .push((key.clone(), "value must be a single line".to_string()));
            }
        }

        let testnet = match self.get(keys::EXCHANGE_TESTNET) {
            None => false,
            Some(raw) => self.parse_bool(keys::EXCHANGE_TESTNET, raw, &mut issues),
        };

        let run_mode = self
            .get(keys::DRY_RUN)
            .map(|raw| RunMode::from_dry_run(self.parse_bool(keys::DRY_RUN, raw, &mut issues)))
            .unwrap_or(RunMode::Simulation);

        let log_level = match self.get(keys::LOG_LEVEL) {
            None => LogLevel::default(),
            Some(raw) => raw.parse().unwrap_or_else(|reason| {
                issues.invalid.push((keys::LOG_LEVEL.to_string(), reason));
                LogLevel::default()
            }),
        };

        if !issues.is_empty() {
            issues.missing.sort();
            issues.invalid.sort();
            return Err(ConfigError::Invalid(issues));
        }

        let value = |key: &str| self.get(key).unwrap_or_default().to_string();

        let config = DeploymentConfig {
            exchange: ExchangeCredentials {
                api_key: Secret::new(value(keys::EXCHANGE_API_KEY)),
                api_secret: Secret::new(value(keys::EXCHANGE_API_SECRET)),
                testnet,
            },
            notification: NotificationIdentity {
                bot_token: Secret::new(value(keys::NOTIFY_TOKEN)),
                chat_id: value(keys::NOTIFY_CHAT_ID),
            },
            run_mode,
            storage_path: value(keys::STORAGE_PATH),
            log_level,
        };

        info!(
            run_mode = %config.run_mode,
            testnet = config.exchange.testnet,
            log_level = %config.log_level,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn parse_bool(&self, key: &str, raw: &str, issues: &mut ConfigIssues) -> bool {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            other => {
                issues
                    .invalid
                    .push((key.to_string(), format!("expected a boolean, got '{}'", other)));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Vec<(&'static str, &'static str)> {
        vec![
            ("BYBIT_API_KEY", "key-123"),
            ("BYBIT_API_SECRET", "secret-456"),
            ("TELEGRAM_BOT_TOKEN", "tg-token"),
            ("TELEGRAM_CHAT_ID", "42"),
            ("DRY_RUN", "true"),
            ("DB_PATH", "/app/data/bot.db"),
        ]
    }

    #[test]
    fn test_defaults_for_optional_keys() {
        let config = ConfigStore::from_map(complete()).load().unwrap();
        assert!(!config.exchange.testnet);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.run_mode, RunMode::Simulation);
    }

    #[test]
    fn test_live_mode_from_dry_run_false() {
        let mut vars = complete();
        vars.retain(|(k, _)| *k != "DRY_RUN");
        vars.push(("DRY_RUN", "False"));
        let config = ConfigStore::from_map(vars).load().unwrap();
        assert_eq!(config.run_mode, RunMode::Live);
    }

    #[test]
    fn test_reports_all_missing_keys() {
        let store = ConfigStore::from_map(vec![("BYBIT_API_KEY", "k"), ("BYBIT_API_SECRET", "")]);
        match store.load() {
            Err(ConfigError::Invalid(issues)) => {
                assert_eq!(
                    issues.missing,
                    vec![
                        "BYBIT_API_SECRET",
                        "DB_PATH",
                        "DRY_RUN",
                        "TELEGRAM_BOT_TOKEN",
                        "TELEGRAM_CHAT_ID"
                    ]
                );
            }
            other => panic!("expected missing keys, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut vars = complete();
        vars.push(("BYBIT_TESTNET", "maybe"));
        vars.push(("LOG_LEVEL", "chatty"));
        let err = ConfigStore::from_map(vars).load().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("invalid BYBIT_TESTNET"));
        assert!(message.contains("invalid LOG_LEVEL"));
    }

    #[test]
    fn test_error_and_debug_never_contain_secrets() {
        let mut vars = complete();
        vars.push(("LOG_LEVEL", "chatty"));
        let store = ConfigStore::from_map(vars);
        let debug = format!("{:?}", store);
        assert!(!debug.contains("secret-456"));
        let err = store.load().unwrap_err().to_string();
        assert!(!err.contains("secret-456"));
        assert!(!err.contains("key-123"));
    }

    #[test]
    fn test_merge_prefers_non_empty_overrides() {
        let mut base = ConfigStore::from_map(complete());
        base.merge(ConfigStore::from_map(vec![
            ("DRY_RUN", "false"),
            ("DB_PATH", ""),
            ("UNRELATED", "x"),
        ]));
        assert_eq!(base.get("DRY_RUN"), Some("false"));
        assert_eq!(base.get("DB_PATH"), Some("/app/data/bot.db"));
        assert_eq!(base.get("UNRELATED"), None);
    }
}
