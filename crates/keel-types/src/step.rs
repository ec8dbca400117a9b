//! Pipeline steps, used to identify where a fatal error occurred

use serde::{Deserialize, Serialize};
use std::fmt;

/// A step of the deployment pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Config,
    Provision,
    Bootstrap,
    Sync,
    Build,
    Run,
    Replace,
    Stop,
    Verify,
    Promote,
    Rollback,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Config => "config",
            Step::Provision => "provision",
            Step::Bootstrap => "bootstrap",
            Step::Sync => "sync",
            Step::Build => "build",
            Step::Run => "run",
            Step::Replace => "replace",
            Step::Stop => "stop",
            Step::Verify => "verify",
            Step::Promote => "promote",
            Step::Rollback => "rollback",
        };
        f.write_str(name)
    }
}
