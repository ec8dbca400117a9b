//! Keel CLI - drives a staged deployment from the operator's terminal
//!
//! Every step of the pipeline is available on its own:
//! - `provision`, `bootstrap`: the host and its container runtime
//! - `sync`, `push-env`, `build`: releases, configuration and images
//! - `run`, `replace`, `stop`, `logs`: the single container slot
//! - `check`, `status`, `stage`: health and promotion state
//! - `promote`, `rollback`: stage transitions, always operator-triggered
//!
//! `deploy` runs config → provision → bootstrap → sync → build → replace →
//! verify in order and never promotes.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod context;
mod lock;
mod output;
mod settings;

use commands::{host, instance, release, stage};
use context::Context;
use keel_types::HealthStatus;
use lock::OperatorLock;
use settings::OrchestratorSettings;

/// Keel CLI application
#[derive(Parser)]
#[command(name = "keel")]
#[command(about = "Keel - staged deployment orchestrator", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, env = "KEEL_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `keel_health=debug`
    #[arg(long, env = "KEEL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,

    /// Output format for command results
    #[arg(short, long, value_enum, default_value_t = output::OutputFormat::Table)]
    output: output::OutputFormat,

    /// Remove a stale operator lock before running
    #[arg(long)]
    force_unlock: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Create the host, or reuse it if it exists
    Provision,

    /// Install the container runtime and the remote directories
    Bootstrap,

    /// Upload the source tree as a new release and make it live
    Sync {
        #[arg(default_value = ".")]
        source: PathBuf,
    },

    /// Write the deployment configuration to the host's env file
    PushEnv,

    /// Build the image of the live release
    Build,

    /// Start the instance; fails if one already exists
    Run {
        /// Image to run instead of the live release's
        #[arg(long)]
        image: Option<String>,
    },

    /// Stop and remove the instance, then start it again
    Replace {
        /// Image to run instead of the live release's
        #[arg(long)]
        image: Option<String>,
    },

    /// Full pipeline from configuration to verification
    Deploy {
        #[arg(default_value = ".")]
        source: PathBuf,
    },

    /// Promote SIMULATION to LIVE
    Promote {
        /// Who is promoting
        #[arg(long, env = "USER", default_value = "operator")]
        actor: String,

        /// Confirm the simulated signals were compared against an independent reference
        #[arg(long)]
        acknowledge_signals: bool,
    },

    /// Return to SIMULATION from any stage
    Rollback {
        /// Stop the instance instead of replacing it in simulation mode
        #[arg(long)]
        halt: bool,

        #[arg(long)]
        reason: Option<String>,

        #[arg(long, env = "USER", default_value = "operator")]
        actor: String,
    },

    /// Stop the instance without changing the stage
    Stop,

    /// Host, instance and stage at a glance
    Status,

    /// Classify the instance from its logs
    Check {
        /// Poll until HEALTHY or FAILED, up to the pipeline's verify timeout
        #[arg(long)]
        wait: bool,
    },

    /// Print the instance's log lines
    Logs {
        #[arg(long, default_value_t = 100)]
        tail: usize,

        /// RFC 3339 instant or relative age (`15m`, `2h`)
        #[arg(long)]
        since: Option<String>,
    },

    /// Current stage and its history
    Stage,

    /// Write a settings template
    InitConfig {
        #[arg(default_value = "keel.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Provision => "provision",
            Commands::Bootstrap => "bootstrap",
            Commands::Sync { .. } => "sync",
            Commands::PushEnv => "push-env",
            Commands::Build => "build",
            Commands::Run { .. } => "run",
            Commands::Replace { .. } => "replace",
            Commands::Deploy { .. } => "deploy",
            Commands::Promote { .. } => "promote",
            Commands::Rollback { .. } => "rollback",
            Commands::Stop => "stop",
            Commands::Status => "status",
            Commands::Check { .. } => "check",
            Commands::Logs { .. } => "logs",
            Commands::Stage => "stage",
            Commands::InitConfig { .. } => "init-config",
        }
    }

    /// Commands that change the host, the container or the stage record.
    fn mutates(&self) -> bool {
        !matches!(
            self,
            Commands::Status | Commands::Logs { .. } | Commands::Stage | Commands::InitConfig { .. }
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json);

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .without_time()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::InitConfig { path, force } = &cli.command {
        init_config(path, *force)?;
        return Ok(ExitCode::SUCCESS);
    }

    let settings = OrchestratorSettings::load(cli.config.as_deref())?;
    if cli.force_unlock && OperatorLock::force_unlock(&settings.state_dir)? {
        output::print_warning("Removed a stale operator lock");
    }
    let _lock = if cli.command.mutates() {
        Some(OperatorLock::acquire(&settings.state_dir, cli.command.name())?)
    } else {
        None
    };

    let ctx = Context::new(settings)?;
    let format = cli.output;

    match cli.command {
        Commands::Provision => host::provision(&ctx, format).await?,
        Commands::Bootstrap => host::bootstrap(&ctx).await?,
        Commands::Sync { source } => release::sync(&ctx, &source, format).await?,
        Commands::PushEnv => release::push_env(&ctx).await?,
        Commands::Build => release::build(&ctx).await?,
        Commands::Run { image } => instance::run(&ctx, image.as_deref()).await?,
        Commands::Replace { image } => instance::replace(&ctx, image.as_deref()).await?,
        Commands::Deploy { source } => release::deploy(&ctx, &source, format).await?,
        Commands::Promote {
            actor,
            acknowledge_signals,
        } => stage::promote(&ctx, &actor, acknowledge_signals).await?,
        Commands::Rollback {
            halt,
            reason,
            actor,
        } => stage::rollback(&ctx, halt, &actor, reason).await?,
        Commands::Stop => instance::stop(&ctx).await?,
        Commands::Status => instance::status(&ctx, format).await?,
        Commands::Check { wait } => {
            if instance::check(&ctx, wait, format).await? == HealthStatus::Failed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Logs { tail, since } => instance::logs(&ctx, tail, since.as_deref()).await?,
        Commands::Stage => stage::show(&ctx, format).await?,
        Commands::InitConfig { .. } => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn init_config(path: &std::path::Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
    }
    std::fs::write(path, OrchestratorSettings::template()?)?;
    output::print_success(&format!("Wrote {}", path.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_read_only_commands_skip_the_lock() {
        let cli = Cli::parse_from(["keel", "status"]);
        assert!(!cli.command.mutates());
        let cli = Cli::parse_from(["keel", "rollback", "--halt", "--reason", "slippage"]);
        assert!(cli.command.mutates());
        assert_eq!(cli.command.name(), "rollback");
    }

    #[test]
    fn test_promote_defaults_to_unacknowledged() {
        let cli = Cli::parse_from(["keel", "promote", "--actor", "ana"]);
        match cli.command {
            Commands::Promote {
                actor,
                acknowledge_signals,
            } => {
                assert_eq!(actor, "ana");
                assert!(!acknowledge_signals);
            }
            _ => panic!("expected promote"),
        }
    }

    #[test]
    fn test_init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keel.toml");
        init_config(&path, false).unwrap();
        assert!(init_config(&path, false).is_err());
        assert!(init_config(&path, true).is_ok());
    }
}
