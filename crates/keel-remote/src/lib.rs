//! # Keel Remote
//!
//! The secure remote-execution channel every remote step goes through.
//!
//! - [`RemoteShell`]: trait seam for running commands and placing files on a host
//! - [`SshShell`]: plain `ssh`/`scp` against the host's external address
//! - [`GcloudShell`]: `gcloud compute ssh`/`scp` addressed by instance name
//! - [`LocalShell`]: runs everything on the local machine (single-box setups, tests)
//!
//! With the `test-utils` feature, [`testing::ScriptedShell`] records commands
//! and replays canned outputs.

pub mod error;
pub mod local;
pub mod process;
pub mod quote;
pub mod shell;
pub mod ssh;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{RemoteError, RemoteResult};
pub use local::LocalShell;
pub use process::CommandOutput;
pub use quote::shell_quote;
pub use shell::RemoteShell;
pub use ssh::{GcloudShell, SshShell};
