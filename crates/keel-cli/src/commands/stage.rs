//! Promotion commands

use crate::context::Context;
use crate::output::{self, Field, OutputFormat, TransitionRow};
use anyhow::Result;
use chrono::Utc;
use keel_control::OperatorConfirmation;
use keel_types::RollbackMode;

/// SIMULATION to LIVE.
pub async fn promote(ctx: &Context, actor: &str, acknowledged_signals: bool) -> Result<()> {
    let session = ctx.session().await?;
    let config = ctx.pipeline.load_config()?;
    let confirmation = OperatorConfirmation::new(actor, acknowledged_signals);

    let handle = session.controller.promote(&config, &confirmation).await?;
    output::print_success(&format!(
        "{} promoted to {} by {}; {} ({}) now runs in {} mode",
        ctx.settings.host.name,
        output::colored_stage(keel_types::PromotionStage::Live),
        actor,
        handle.name,
        handle.short_id(),
        handle.run_mode
    ));
    output::print_info("Run `keel check` to confirm the first heartbeat and enter MONITORING");
    Ok(())
}

/// Any stage back to SIMULATION.
pub async fn rollback(ctx: &Context, halt: bool, actor: &str, reason: Option<String>) -> Result<()> {
    let session = ctx.session().await?;
    let config = ctx.pipeline.load_config()?;
    let mode = if halt {
        RollbackMode::Halt
    } else {
        RollbackMode::Simulate
    };

    let replaced = session
        .controller
        .rollback(mode, &config, actor, reason)
        .await?;
    match (mode, replaced) {
        (_, Some(handle)) => output::print_success(&format!(
            "Rolled back; {} ({}) runs in {} mode",
            handle.name,
            handle.short_id(),
            handle.run_mode
        )),
        (RollbackMode::Halt, None) => output::print_success(&format!(
            "Rolled back and halted {}",
            session.lifecycle.instance_name()
        )),
        (RollbackMode::Simulate, None) => {
            output::print_warning("Stage reset to SIMULATION; no instance was running")
        }
    }
    Ok(())
}

/// Current stage and its history.
pub async fn show(ctx: &Context, format: OutputFormat) -> Result<()> {
    let session = ctx.session().await?;
    let record = session.controller.record().await?;

    if let OutputFormat::Json = format {
        output::print_json(&record);
        return Ok(());
    }

    let now = Utc::now();
    let policy = session.controller.policy();
    output::print_rows(
        vec![
            Field::new("stage", output::colored_stage(record.stage)),
            Field::new("run mode", record.run_mode),
            Field::new("entered", record.entered_at.format("%Y-%m-%d %H:%M:%S")),
            Field::new("observed in simulation", output::duration(record.observed_secs(now))),
            Field::new(
                "policy",
                format!(
                    "{:?}, {} minimum",
                    policy.gate,
                    output::duration(policy.min_observation_secs as i64)
                ),
            ),
        ],
        format,
    );

    if !record.history.is_empty() {
        println!();
        output::print_rows(
            record.history.iter().map(TransitionRow::from).collect(),
            format,
        );
    }
    Ok(())
}
