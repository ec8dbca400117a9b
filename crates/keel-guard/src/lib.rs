//! # Keel Guard
//!
//! The container side of the deployment boundary, linked into the
//! supervised service.
//!
//! - [`boot_from_env`] validates the configuration and exits with status 2
//!   when it is unusable, instead of crash-looping.
//! - [`BootMarkers`], [`Heartbeat`] and [`announce_started`] print the log
//!   markers the orchestrator's health verifier looks for.
//! - [`ExecutionGuard`] is the only path from a decision point to an order.
//!   With `DRY_RUN=true` it logs and notifies, and never calls the
//!   [`OrderSink`].
//!
//! ```rust,no_run
//! use keel_guard::{boot_from_env, BootMarkers, Heartbeat, TelegramNotifier, announce_started};
//! use std::time::Duration;
//!
//! # async fn example() -> keel_guard::GuardResult<()> {
//! let config = boot_from_env();
//! let notifier = TelegramNotifier::new(&config.notification)?;
//! let mut markers = BootMarkers::new();
//! // ... load history ...
//! markers.history_loaded(20);
//! announce_started(&notifier, "Coins: 20").await;
//! let heartbeat = Heartbeat::spawn(Duration::from_secs(60));
//! markers.all_systems_go();
//! # heartbeat.stop().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod boot;
pub mod error;
pub mod guard;
pub mod heartbeat;
pub mod notify;
pub mod testing;

pub use boot::{boot, boot_from_env, init_logging, BootMarkers, EXIT_MISCONFIGURED};
pub use error::{GuardError, GuardResult};
pub use guard::{DecisionPoint, Direction, ExecutionGuard, OrderReceipt, OrderSink, Outcome};
pub use heartbeat::Heartbeat;
pub use notify::{announce_started, Notifier, RecordingNotifier, TelegramNotifier};
pub use testing::RecordingOrderSink;
