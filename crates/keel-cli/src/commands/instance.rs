//! Container commands

use crate::context::Context;
use crate::output::{self, Field, OutputFormat};
use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Duration, Utc};
use keel_container::LogQuery;
use keel_types::{HealthStatus, InstanceHandle};
use std::time::Duration as StdDuration;

/// Start the instance; fails if one already exists.
pub async fn run(ctx: &Context, image: Option<&str>) -> Result<()> {
    let session = ctx.session().await?;
    let image = ctx.image(&session, image).await?;
    let config = ctx.stage_config(&session).await?;
    let handle = session.lifecycle.run(&image, &config).await?;
    print_started("Started", &handle);
    Ok(())
}

/// Stop, remove and start the instance.
pub async fn replace(ctx: &Context, image: Option<&str>) -> Result<()> {
    let session = ctx.session().await?;
    let image = ctx.image(&session, image).await?;
    let config = ctx.stage_config(&session).await?;
    let handle = session.lifecycle.replace(&image, &config).await?;
    session.controller.restart_observation().await?;
    print_started("Replaced", &handle);
    Ok(())
}

/// Stop the instance without changing the stage.
pub async fn stop(ctx: &Context) -> Result<()> {
    let session = ctx.session().await?;
    session.lifecycle.stop().await?;
    output::print_success(&format!("Stopped {}", session.lifecycle.instance_name()));
    Ok(())
}

/// Runtime state and stage.
pub async fn status(ctx: &Context, format: OutputFormat) -> Result<()> {
    let session = ctx.session().await?;
    let record = session.controller.record().await?;
    let state = session.lifecycle.status().await?;

    if let OutputFormat::Json = format {
        output::print_json(&serde_json::json!({
            "host": session.host,
            "stage": record,
            "instance": state,
        }));
        return Ok(());
    }

    let now = Utc::now();
    let mut fields = vec![
        Field::new("host", &session.host.name),
        Field::new("address", session.host.external_ip.as_deref().unwrap_or("-")),
        Field::new("stage", output::colored_stage(record.stage)),
        Field::new("stage run mode", record.run_mode),
    ];
    match &state {
        Some(state) => {
            fields.push(Field::new("instance", &state.name));
            fields.push(Field::new("container", &state.container_id.chars().take(12).collect::<String>()));
            fields.push(Field::new("image", &state.image));
            fields.push(Field::new("status", &state.status));
            fields.push(Field::new(
                "run mode",
                state
                    .run_mode
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "unknown".into()),
            ));
            fields.push(Field::new("restarts", state.restart_count));
            fields.push(Field::new(
                "uptime",
                state
                    .uptime_secs(now)
                    .map(output::duration)
                    .unwrap_or_else(|| "-".into()),
            ));
        }
        None => fields.push(Field::new("instance", "absent")),
    }
    output::print_rows(fields, format);

    if let Some(state) = &state {
        if let Some(run_mode) = state.run_mode {
            if run_mode != record.run_mode {
                output::print_warning(&format!(
                    "{} runs in {} mode but the stage is {}; replace or roll back to reconcile",
                    state.name, run_mode, record.stage
                ));
            }
        }
    }
    Ok(())
}

/// One health check, or poll until a verdict with `wait`.
///
/// Exits non-zero when the instance is FAILED.
pub async fn check(ctx: &Context, wait: bool, format: OutputFormat) -> Result<HealthStatus> {
    let session = ctx.session().await?;

    let report = if wait {
        let Some(handle) = ctx.instance(&session.lifecycle).await? else {
            bail!("no running instance named {}", session.lifecycle.instance_name());
        };
        let pipeline = &ctx.settings.pipeline;
        session
            .verifier
            .await_verdict(
                &handle,
                StdDuration::from_secs(pipeline.verify_timeout_secs),
                StdDuration::from_secs(pipeline.verify_poll_secs.max(1)),
            )
            .await?
    } else {
        session
            .verifier
            .check_instance(&session.lifecycle.instance_name())
            .await?
    };
    let transition = session.controller.apply_observation(&report).await?;

    output::print_report(&report, format);
    if let Some(transition) = transition {
        output::print_success(&format!(
            "Stage is now {}",
            output::colored_stage(transition.to)
        ));
    }
    Ok(report.status)
}

/// Print the instance's log lines.
pub async fn logs(ctx: &Context, tail: usize, since: Option<&str>) -> Result<()> {
    let session = ctx.session().await?;
    let query = LogQuery {
        since: since.map(parse_since).transpose()?,
        tail: Some(tail),
    };
    for line in session.lifecycle.logs(&query).await? {
        println!("{}", line);
    }
    Ok(())
}

fn print_started(verb: &str, handle: &InstanceHandle) {
    output::print_success(&format!(
        "{} {} ({}) from {} in {} mode",
        verb,
        handle.name,
        handle.short_id(),
        handle.image,
        handle.run_mode
    ));
}

/// RFC 3339 instant, or a relative age such as `90s`, `15m`, `2h`, `1d`.
fn parse_since(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let raw = raw.trim();
    let (digits, unit) = raw.split_at(raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len()));
    let n: i64 = digits
        .parse()
        .with_context(|| format!("invalid --since value '{}'", raw))?;
    let age = match unit {
        "" | "s" => Duration::seconds(n),
        "m" => Duration::minutes(n),
        "h" => Duration::hours(n),
        "d" => Duration::days(n),
        other => bail!("invalid --since unit '{}' (use s, m, h or d)", other),
    };
    Ok(Utc::now() - age)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_since_relative() {
        let before = Utc::now() - Duration::minutes(15);
        let since = parse_since("15m").unwrap();
        assert!((since - before).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_parse_since_absolute() {
        let since = parse_since("2026-01-02T03:04:05Z").unwrap();
        assert_eq!(since.to_rfc3339(), "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_parse_since_rejects_garbage() {
        assert!(parse_since("soon").is_err());
        assert!(parse_since("5w").is_err());
    }
}
