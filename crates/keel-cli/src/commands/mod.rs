//! CLI command implementations

pub mod host;
pub mod instance;
pub mod release;
pub mod stage;
