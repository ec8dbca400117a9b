//! Docker CLI runtime over the remote channel

use crate::error::{ContainerError, ContainerResult};
use crate::runtime::{ContainerRuntime, LogQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_remote::{shell_quote, RemoteShell};
use keel_types::{
    ContainerInstance, ContainerStatus, HostHandle, ImageRef, InstanceName, InstanceState, RunMode,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Label recording the run mode a container was started with
pub const RUN_MODE_LABEL: &str = "keel.run-mode";

/// Lines of build output kept in a build error
const BUILD_ERROR_TAIL: usize = 20;

/// Docker CLI executed on the host through a [`RemoteShell`]
pub struct DockerCli {
    shell: Arc<dyn RemoteShell>,
    host: HostHandle,
    docker: String,
}

impl DockerCli {
    pub fn new(shell: Arc<dyn RemoteShell>, host: HostHandle) -> Self {
        Self {
            shell,
            host,
            docker: "docker".to_string(),
        }
    }

    /// Prefix docker invocations with `sudo`.
    pub fn with_sudo(mut self) -> Self {
        self.docker = "sudo docker".to_string();
        self
    }

    fn run_args(&self, instance: &ContainerInstance) -> String {
        format!(
            "{docker} run -d --name {name} --restart {restart} --env-file {env_file} -v {volume} --label {label}={mode} {image}",
            docker = self.docker,
            name = shell_quote(instance.name.as_str()),
            restart = instance.restart_policy.as_docker_arg(),
            env_file = shell_quote(&instance.env_file),
            volume = shell_quote(&instance.volume.as_docker_arg()),
            label = RUN_MODE_LABEL,
            mode = instance.run_mode,
            image = shell_quote(&instance.image.to_string()),
        )
    }
}

fn no_such_container(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such container") || lower.contains("no such object")
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

// Subset of `docker inspect` output we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Inspect {
    id: String,
    #[serde(default)]
    restart_count: u32,
    state: InspectState,
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    #[serde(default)]
    exit_code: i32,
    started_at: Option<String>,
    finished_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

/// Docker reports unset times as `0001-01-01T00:00:00Z`.
fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| t.timestamp() > 0)
}

fn parse_inspect(name: &InstanceName, json: &str) -> ContainerResult<Option<InstanceState>> {
    let items: Vec<Inspect> =
        serde_json::from_str(json).map_err(|e| ContainerError::Parse(e.to_string()))?;
    let Some(item) = items.into_iter().next() else {
        return Ok(None);
    };

    let run_mode = item
        .config
        .labels
        .as_ref()
        .and_then(|l| l.get(RUN_MODE_LABEL))
        .and_then(|m| match m.as_str() {
            "simulation" => Some(RunMode::Simulation),
            "live" => Some(RunMode::Live),
            _ => None,
        });

    Ok(Some(InstanceState {
        name: name.clone(),
        container_id: item.id,
        image: ImageRef::parse(&item.config.image),
        status: ContainerStatus::from_runtime(&item.state.status, item.state.exit_code),
        restart_count: item.restart_count,
        started_at: parse_time(item.state.started_at.as_deref()),
        finished_at: parse_time(item.state.finished_at.as_deref()),
        run_mode,
    }))
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn missing_files(&self, context: &str, files: &[String]) -> ContainerResult<Vec<String>> {
        let list: Vec<String> = files.iter().map(|f| shell_quote(f)).collect();
        let cmd = format!(
            "cd {} && for f in {}; do [ -e \"$f\" ] || echo \"$f\"; done",
            shell_quote(context),
            list.join(" ")
        );
        let out = self.shell.exec(&self.host, &cmd).await?;
        if !out.success() {
            // The context itself is missing
            return Ok(files.to_vec());
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    async fn build(&self, context: &str, image: &ImageRef) -> ContainerResult<()> {
        let cmd = format!(
            "{} build -t {} {}",
            self.docker,
            shell_quote(&image.to_string()),
            shell_quote(context)
        );
        let out = self.shell.exec(&self.host, &cmd).await?;
        if !out.success() {
            let message = if out.stderr.trim().is_empty() {
                tail_lines(&out.stdout, BUILD_ERROR_TAIL)
            } else {
                tail_lines(&out.stderr, BUILD_ERROR_TAIL)
            };
            return Err(ContainerError::Build {
                image: image.to_string(),
                message,
            });
        }
        Ok(())
    }

    async fn inspect(&self, name: &InstanceName) -> ContainerResult<Option<InstanceState>> {
        let cmd = format!(
            "{} inspect --type container {}",
            self.docker,
            shell_quote(name.as_str())
        );
        let out = self.shell.exec(&self.host, &cmd).await?;
        if !out.success() {
            if no_such_container(&out.stderr) {
                return Ok(None);
            }
            return Err(ContainerError::Runtime(out.stderr.trim().to_string()));
        }
        parse_inspect(name, &out.stdout)
    }

    async fn write_env_file(&self, path: &str, contents: &str) -> ContainerResult<()> {
        self.shell
            .write_file(&self.host, path, contents.as_bytes(), 0o600)
            .await?;
        Ok(())
    }

    async fn run(&self, instance: &ContainerInstance) -> ContainerResult<String> {
        let cmd = self.run_args(instance);
        let out = self.shell.exec(&self.host, &cmd).await?;
        if !out.success() {
            if out.stderr.contains("is already in use") {
                let container_id = out
                    .stderr
                    .split("by container \"")
                    .nth(1)
                    .and_then(|rest| rest.split('"').next())
                    .unwrap_or("unknown")
                    .to_string();
                return Err(ContainerError::NameConflict {
                    name: instance.name.to_string(),
                    container_id,
                });
            }
            return Err(ContainerError::Runtime(out.stderr.trim().to_string()));
        }
        let id = out.stdout.trim().to_string();
        debug!(container_id = %id, "Container started");
        Ok(id)
    }

    async fn stop(&self, name: &InstanceName, timeout_secs: u64) -> ContainerResult<()> {
        let cmd = format!(
            "{} stop -t {} {}",
            self.docker,
            timeout_secs,
            shell_quote(name.as_str())
        );
        let out = self.shell.exec(&self.host, &cmd).await?;
        if !out.success() {
            if no_such_container(&out.stderr) {
                return Err(ContainerError::NotFound(name.to_string()));
            }
            return Err(ContainerError::Runtime(out.stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn remove(&self, name: &InstanceName) -> ContainerResult<()> {
        let cmd = format!("{} rm {}", self.docker, shell_quote(name.as_str()));
        let out = self.shell.exec(&self.host, &cmd).await?;
        if !out.success() {
            if no_such_container(&out.stderr) {
                return Err(ContainerError::NotFound(name.to_string()));
            }
            return Err(ContainerError::Runtime(out.stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn logs(&self, name: &InstanceName, query: &LogQuery) -> ContainerResult<Vec<String>> {
        let mut cmd = format!("{} logs --timestamps", self.docker);
        if let Some(since) = query.since {
            cmd.push_str(&format!(" --since {}", since.to_rfc3339()));
        }
        if let Some(tail) = query.tail {
            cmd.push_str(&format!(" --tail {}", tail));
        }
        cmd.push_str(&format!(" {} 2>&1", shell_quote(name.as_str())));

        let out = self.shell.exec(&self.host, &cmd).await?;
        if !out.success() {
            if no_such_container(&out.stdout) || no_such_container(&out.stderr) {
                return Err(ContainerError::NotFound(name.to_string()));
            }
            return Err(ContainerError::Runtime(out.stdout.trim().to_string()));
        }
        Ok(out.stdout.lines().map(String::from).collect())
    }

    fn target(&self) -> &str {
        &self.host.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_remote::testing::ScriptedShell;
    use keel_remote::CommandOutput;
    use keel_types::{RestartPolicy, VolumeMount};

    const INSPECT: &str = r#"[{
        "Id": "f3a9c2e1b4d5f3a9c2e1b4d5",
        "Name": "/bot",
        "RestartCount": 4,
        "State": {
            "Status": "restarting",
            "Restarting": true,
            "ExitCode": 1,
            "StartedAt": "2024-05-01T10:00:00.123456789Z",
            "FinishedAt": "2024-05-01T10:00:03.5Z"
        },
        "Config": {
            "Image": "trading-bot:0123456789ab",
            "Env": ["DRY_RUN=true", "BYBIT_API_SECRET=hunter2"],
            "Labels": {"keel.run-mode": "simulation"}
        }
    }]"#;

    fn host() -> HostHandle {
        HostHandle {
            id: "1".into(),
            name: "trading-bot".into(),
            zone: "asia-southeast1-b".into(),
            external_ip: Some("203.0.113.5".into()),
            tags: vec![],
        }
    }

    fn instance() -> ContainerInstance {
        ContainerInstance {
            name: InstanceName::new("bot"),
            image: ImageRef::new("trading-bot", "0123456789ab"),
            restart_policy: RestartPolicy::UnlessStopped,
            volume: VolumeMount::new("/opt/keel/data", "/app/data"),
            env_file: "/opt/keel/shared/.env".into(),
            run_mode: RunMode::Simulation,
        }
    }

    #[test]
    fn test_parse_inspect() {
        let state = parse_inspect(&InstanceName::new("bot"), INSPECT)
            .unwrap()
            .unwrap();
        assert_eq!(state.status, ContainerStatus::Restarting);
        assert_eq!(state.restart_count, 4);
        assert_eq!(state.image, ImageRef::new("trading-bot", "0123456789ab"));
        assert_eq!(state.run_mode, Some(RunMode::Simulation));
        assert!(state.started_at.is_some());
    }

    #[test]
    fn test_zero_time_is_unset() {
        assert!(parse_time(Some("0001-01-01T00:00:00Z")).is_none());
        assert!(parse_time(None).is_none());
    }

    #[test]
    fn test_run_args_use_env_file() {
        let docker = DockerCli::new(Arc::new(ScriptedShell::new()), host());
        let cmd = docker.run_args(&instance());
        assert_eq!(
            cmd,
            "docker run -d --name bot --restart unless-stopped --env-file /opt/keel/shared/.env \
             -v /opt/keel/data:/app/data --label keel.run-mode=simulation trading-bot:0123456789ab"
        );
        assert!(!cmd.contains(" -e "));
    }

    #[tokio::test]
    async fn test_inspect_missing_container() {
        let shell = Arc::new(ScriptedShell::new());
        shell.respond(
            "inspect",
            CommandOutput::failed(1, "Error: No such container: bot"),
        );
        let docker = DockerCli::new(shell, host());
        assert!(docker.inspect(&InstanceName::new("bot")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_name_conflict() {
        let shell = Arc::new(ScriptedShell::new());
        shell.respond(
            "docker run",
            CommandOutput::failed(
                125,
                "docker: Error response from daemon: Conflict. The container name \"/bot\" is already in use by container \"f3a9c2e1\". You have to remove (or rename) that container to be able to reuse that name.",
            ),
        );
        let docker = DockerCli::new(shell, host());
        match docker.run(&instance()).await {
            Err(ContainerError::NameConflict { name, container_id }) => {
                assert_eq!(name, "bot");
                assert_eq!(container_id, "f3a9c2e1");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_build_failure_keeps_output_tail() {
        let shell = Arc::new(ScriptedShell::new());
        shell.respond(
            "docker build",
            CommandOutput::failed(
                1,
                "#8 ERROR: No matching distribution found for pybit==9.9.9\nERROR: failed to solve",
            ),
        );
        let docker = DockerCli::new(shell, host());
        let err = docker
            .build("/opt/keel/current", &ImageRef::new("trading-bot", "abc"))
            .await
            .unwrap_err();
        assert!(err.is_build_error());
        assert!(err.to_string().contains("No matching distribution"));
    }

    #[tokio::test]
    async fn test_missing_files_lists_absent() {
        let shell = Arc::new(ScriptedShell::new());
        shell.respond("for f in", CommandOutput::ok("requirements.txt\n"));
        let docker = DockerCli::new(shell.clone(), host());
        let missing = docker
            .missing_files(
                "/opt/keel/current",
                &["Dockerfile".to_string(), "requirements.txt".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(missing, vec!["requirements.txt".to_string()]);
        assert!(shell.ran("cd /opt/keel/current"));
    }

    #[tokio::test]
    async fn test_logs_query() {
        let shell = Arc::new(ScriptedShell::new());
        shell.respond(
            "docker logs",
            CommandOutput::ok("2024-05-01T10:00:00Z [BOOT] ✅ All systems go. Running...\n"),
        );
        let docker = DockerCli::new(shell.clone(), host()).with_sudo();
        let lines = docker
            .logs(&InstanceName::new("bot"), &LogQuery::tail(200))
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert!(shell.ran("sudo docker logs --timestamps --tail 200 bot 2>&1"));
    }
}
