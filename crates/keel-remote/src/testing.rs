//! Scripted shell for tests

use crate::error::{RemoteError, RemoteResult};
use crate::process::CommandOutput;
use crate::shell::RemoteShell;
use async_trait::async_trait;
use keel_types::HostHandle;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// One call observed by a [`ScriptedShell`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Exec(String),
    Upload { local: String, remote: String },
    WriteFile { path: String, mode: u32 },
}

struct Rule {
    needle: String,
    output: CommandOutput,
    once: bool,
}

/// Records every call and answers `exec` from substring rules
///
/// Rules are matched in insertion order; unmatched commands succeed with
/// empty output.
#[derive(Default)]
pub struct ScriptedShell {
    calls: Mutex<Vec<RecordedCall>>,
    rules: Mutex<Vec<Rule>>,
    files: Mutex<HashMap<String, (Vec<u8>, u32)>>,
    fail_uploads: Mutex<bool>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every command containing `needle` with `output`.
    pub fn respond(&self, needle: impl Into<String>, output: CommandOutput) -> &Self {
        lock(&self.rules).push(Rule {
            needle: needle.into(),
            output,
            once: false,
        });
        self
    }

    /// Answer the next command containing `needle` with `output`, then forget the rule.
    pub fn respond_once(&self, needle: impl Into<String>, output: CommandOutput) -> &Self {
        lock(&self.rules).push(Rule {
            needle: needle.into(),
            output,
            once: true,
        });
        self
    }

    pub fn fail_uploads(&self, fail: bool) {
        *lock(&self.fail_uploads) = fail;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Executed command lines, in order.
    pub fn commands(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Exec(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether any executed command contains `needle`.
    pub fn ran(&self, needle: &str) -> bool {
        self.commands().iter().any(|c| c.contains(needle))
    }

    /// Content and mode of a file written through the shell.
    pub fn file(&self, path: &str) -> Option<(Vec<u8>, u32)> {
        lock(&self.files).get(path).cloned()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl RemoteShell for ScriptedShell {
    async fn exec(&self, _host: &HostHandle, command: &str) -> RemoteResult<CommandOutput> {
        lock(&self.calls).push(RecordedCall::Exec(command.to_string()));

        let mut rules = lock(&self.rules);
        if let Some(idx) = rules.iter().position(|r| command.contains(&r.needle)) {
            let output = rules[idx].output.clone();
            if rules[idx].once {
                rules.remove(idx);
            }
            return Ok(output);
        }
        Ok(CommandOutput::ok(""))
    }

    async fn upload(&self, _host: &HostHandle, local: &Path, remote: &str) -> RemoteResult<()> {
        lock(&self.calls).push(RecordedCall::Upload {
            local: local.display().to_string(),
            remote: remote.to_string(),
        });
        if *lock(&self.fail_uploads) {
            return Err(RemoteError::CommandFailed {
                command: format!("upload {}", remote),
                status: Some(1),
                stderr: "connection reset".into(),
            });
        }
        Ok(())
    }

    async fn write_file(
        &self,
        _host: &HostHandle,
        path: &str,
        contents: &[u8],
        mode: u32,
    ) -> RemoteResult<()> {
        lock(&self.calls).push(RecordedCall::WriteFile {
            path: path.to_string(),
            mode,
        });
        lock(&self.files).insert(path.to_string(), (contents.to_vec(), mode));
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
