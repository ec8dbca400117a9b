//! Operating configuration of the supervised service
//!
//! A `DeploymentConfig` is built once from the environment layer and then
//! passed around by value. Nothing mutates it in place: the promotion stages
//! derive a new value with [`DeploymentConfig::with_run_mode`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Names of the environment keys making up the configuration surface.
pub mod keys {
    pub const EXCHANGE_API_KEY: &str = "BYBIT_API_KEY";
    pub const EXCHANGE_API_SECRET: &str = "BYBIT_API_SECRET";
    pub const EXCHANGE_TESTNET: &str = "BYBIT_TESTNET";
    pub const NOTIFY_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
    pub const NOTIFY_CHAT_ID: &str = "TELEGRAM_CHAT_ID";
    pub const DRY_RUN: &str = "DRY_RUN";
    pub const STORAGE_PATH: &str = "DB_PATH";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";

    /// Keys that must be present for a valid boot.
    pub const REQUIRED: &[&str] = &[
        EXCHANGE_API_KEY,
        EXCHANGE_API_SECRET,
        NOTIFY_TOKEN,
        NOTIFY_CHAT_ID,
        DRY_RUN,
        STORAGE_PATH,
    ];

    /// Keys holding secret material.
    pub const SECRET: &[&str] = &[EXCHANGE_API_KEY, EXCHANGE_API_SECRET, NOTIFY_TOKEN];
}

/// A secret string that never prints its value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw value. Only the env-file renderer and the notifier
    /// should need this.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Whether the service may produce external side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Decision points are logged and notified, never executed.
    Simulation,
    /// Decision points place real orders.
    Live,
}

impl RunMode {
    /// Map the service's `DRY_RUN` flag onto a run mode.
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            RunMode::Simulation
        } else {
            RunMode::Live
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, RunMode::Simulation)
    }

    pub fn allows_side_effects(&self) -> bool {
        matches!(self, RunMode::Live)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Simulation => write!(f, "simulation"),
            RunMode::Live => write!(f, "live"),
        }
    }
}

/// Log verbosity understood by the supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_env_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// Equivalent `tracing` filter directive.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_env_str())
    }
}

/// Exchange credential set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeCredentials {
    pub api_key: Secret,
    pub api_secret: Secret,
    pub testnet: bool,
}

/// Identity of the outbound notification channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationIdentity {
    pub bot_token: Secret,
    pub chat_id: String,
}

/// The service's complete operating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub exchange: ExchangeCredentials,
    pub notification: NotificationIdentity,
    pub run_mode: RunMode,
    pub storage_path: String,
    pub log_level: LogLevel,
}

impl DeploymentConfig {
    /// Derive a copy with a different run mode.
    pub fn with_run_mode(&self, run_mode: RunMode) -> Self {
        Self {
            run_mode,
            ..self.clone()
        }
    }

    /// Key/value pairs of the container environment surface, secrets included.
    pub fn env_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (keys::EXCHANGE_API_KEY, self.exchange.api_key.expose().to_string()),
            (
                keys::EXCHANGE_API_SECRET,
                self.exchange.api_secret.expose().to_string(),
            ),
            (keys::EXCHANGE_TESTNET, self.exchange.testnet.to_string()),
            (
                keys::NOTIFY_TOKEN,
                self.notification.bot_token.expose().to_string(),
            ),
            (keys::NOTIFY_CHAT_ID, self.notification.chat_id.clone()),
            (keys::DRY_RUN, self.run_mode.is_dry_run().to_string()),
            (keys::STORAGE_PATH, self.storage_path.clone()),
            (keys::LOG_LEVEL, self.log_level.as_env_str().to_string()),
        ]
    }

    /// Render as a `KEY=VALUE` env file accepted by `docker run --env-file`.
    pub fn render_env_file(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.env_pairs() {
            out.push_str(key);
            out.push('=');
            out.push_str(&value);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DeploymentConfig {
        DeploymentConfig {
            exchange: ExchangeCredentials {
                api_key: Secret::new("key-123"),
                api_secret: Secret::new("secret-456"),
                testnet: false,
            },
            notification: NotificationIdentity {
                bot_token: Secret::new("tg-token"),
                chat_id: "42".into(),
            },
            run_mode: RunMode::Simulation,
            storage_path: "/app/data/bot.db".into(),
            log_level: LogLevel::Info,
        }
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("key-123"));
        assert!(!rendered.contains("secret-456"));
        assert!(!rendered.contains("tg-token"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn test_with_run_mode_leaves_original_untouched() {
        let sim = sample();
        let live = sim.with_run_mode(RunMode::Live);
        assert_eq!(sim.run_mode, RunMode::Simulation);
        assert_eq!(live.run_mode, RunMode::Live);
        assert_eq!(live.exchange, sim.exchange);
    }

    #[test]
    fn test_env_file_maps_run_mode_to_dry_run() {
        let sim = sample().render_env_file();
        assert!(sim.contains("DRY_RUN=true\n"));
        let live = sample().with_run_mode(RunMode::Live).render_env_file();
        assert!(live.contains("DRY_RUN=false\n"));
        assert!(live.contains("BYBIT_API_KEY=key-123\n"));
        assert!(live.contains("LOG_LEVEL=INFO\n"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!(" Debug ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
