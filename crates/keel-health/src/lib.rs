//! # Keel Health
//!
//! Advisory health verification of the supervised service from its log
//! stream.
//!
//! The service prints fixed markers: a boot line once it is ready, a line
//! after historical data has loaded, a periodic heartbeat, and a line once
//! its "started" notification was delivered. [`HealthVerifier::check`] tails
//! the instance's timestamped logs, looks for those markers, combines them
//! with the runtime's restart accounting and classifies the instance:
//!
//! | Status   | Meaning                                                    |
//! |----------|------------------------------------------------------------|
//! | FAILED   | crash-loop, or exited non-zero and not restarting          |
//! | UNKNOWN  | not enough log history yet                                 |
//! | DEGRADED | heartbeat stale or missing, or a boot-time marker missing  |
//! | HEALTHY  | everything present and fresh                               |
//!
//! The report also counts would-execute notices and live executions, so an
//! operator can confirm that a simulation run produced no side effects.

pub mod audit;
pub mod config;
pub mod crash_loop;
pub mod error;
pub mod logline;
pub mod report;
pub mod verifier;

pub use audit::{LogMarkerAudit, NotificationAudit};
pub use config::{HealthConfig, MarkerSet};
pub use crash_loop::CrashLoopDetector;
pub use error::{HealthError, HealthResult};
pub use logline::LogLine;
pub use report::HealthReport;
pub use verifier::HealthVerifier;
