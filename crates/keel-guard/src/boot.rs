//! Boot validation and lifecycle markers

use crate::error::GuardResult;
use keel_config::ConfigStore;
use keel_types::{markers, DeploymentConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status for a configuration the service cannot run with.
///
/// Distinct from crash exits so a restart loop caused by bad configuration
/// is recognizable in the runtime's exit code.
pub const EXIT_MISCONFIGURED: i32 = 2;

/// Validate `store` and announce the resulting run mode.
pub fn boot(store: &ConfigStore) -> GuardResult<DeploymentConfig> {
    let config = store.load()?;
    info!(
        run_mode = %config.run_mode,
        testnet = config.exchange.testnet,
        storage = %config.storage_path,
        "[BOOT] Configuration loaded"
    );
    if config.run_mode.is_dry_run() {
        warn!("[BOOT] DRY RUN mode: decision points are logged and notified, no orders are placed");
    }
    Ok(config)
}

/// Load the configuration from the process environment, or exit.
///
/// Logging is initialised at the configured level. A misconfigured service
/// exits with [`EXIT_MISCONFIGURED`] instead of looping.
pub fn boot_from_env() -> DeploymentConfig {
    let store = ConfigStore::from_env();
    let level = store
        .get(keel_types::keys::LOG_LEVEL)
        .and_then(|l| l.parse::<keel_types::LogLevel>().ok())
        .unwrap_or_default();
    init_logging(level);

    match boot(&store) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "[BOOT] Refusing to start");
            std::process::exit(EXIT_MISCONFIGURED);
        }
    }
}

/// Install a plain-text subscriber on stdout. `RUST_LOG` overrides `level`.
pub fn init_logging(level: keel_types::LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Emits the boot-sequence markers the health verifier looks for
///
/// The order is fixed: history, then the started notification, then ready.
#[derive(Debug, Default)]
pub struct BootMarkers {
    history: bool,
    ready: bool,
}

impl BootMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history_loaded(&mut self, symbols: usize) {
        self.history = true;
        info!(symbols, "{} for all coins.", markers::HISTORY);
    }

    /// Ready to process events.
    pub fn all_systems_go(&mut self) {
        if !self.history {
            warn!("[BOOT] Ready before historical data was loaded");
        }
        self.ready = true;
        info!("{}. Running...", markers::BOOT);
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn shutdown(&self) {
        info!("{} Stopping...", markers::SHUTDOWN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_rejects_missing_keys() {
        let store = ConfigStore::from_map([("DRY_RUN", "true")]);
        let err = boot(&store).unwrap_err();
        assert!(err.to_string().contains("BYBIT_API_KEY"));
    }

    #[test]
    fn test_boot_accepts_complete_config() {
        let store = ConfigStore::from_map([
            ("BYBIT_API_KEY", "k"),
            ("BYBIT_API_SECRET", "s"),
            ("TELEGRAM_BOT_TOKEN", "t"),
            ("TELEGRAM_CHAT_ID", "1"),
            ("DRY_RUN", "yes"),
            ("DB_PATH", "/app/data/bot.db"),
        ]);
        let config = boot(&store).unwrap();
        assert!(config.run_mode.is_dry_run());
    }

    #[test]
    fn test_markers_track_readiness() {
        let mut markers = BootMarkers::new();
        markers.history_loaded(20);
        assert!(!markers.is_ready());
        markers.all_systems_go();
        assert!(markers.is_ready());
    }
}
