//! # Keel Config
//!
//! Loads the supervised service's operating configuration from an
//! environment layer and validates it before anything is deployed.
//!
//! The same store is used on both sides of the container boundary: the
//! orchestrator validates the operator's env file before shipping it, and
//! the service validates its process environment at boot.
//!
//! ```rust,no_run
//! use keel_config::ConfigStore;
//!
//! # fn example() -> Result<(), keel_config::ConfigError> {
//! let store = ConfigStore::layered(Some(std::path::Path::new(".env")))?;
//! let config = store.load()?;
//! println!("run mode: {}", config.run_mode);
//! # Ok(())
//! # }
//! ```
//!
//! Secret values never reach a log line: only key names are logged, and the
//! returned [`keel_types::DeploymentConfig`] redacts secrets in `Debug`.

pub mod env_file;
pub mod error;
pub mod store;

pub use error::{ConfigError, ConfigIssues, ConfigResult};
pub use store::ConfigStore;
