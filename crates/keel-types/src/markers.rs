//! Log markers shared by the service guard and the health verifier
//!
//! The guard prints these; the verifier searches for them in the container's
//! log stream. Each is a substring of the logged message.

/// Service is ready and processing events
pub const BOOT: &str = "[BOOT] ✅ All systems go";
/// Historical data finished loading
pub const HISTORY: &str = "[BOOT] Historical data loaded";
/// Periodic liveness
pub const HEARTBEAT: &str = "[HEARTBEAT]";
/// The "started" notification was delivered
pub const NOTIFY_ACK: &str = "[NOTIFY] started";
/// A decision point suppressed in simulation
pub const WOULD_EXECUTE: &str = "[DRY RUN] 🔔 WOULD EXECUTE";
/// A real side-effecting action
pub const LIVE_EXECUTE: &str = "[EXECUTE]";
/// Graceful shutdown
pub const SHUTDOWN: &str = "[SHUTDOWN]";
