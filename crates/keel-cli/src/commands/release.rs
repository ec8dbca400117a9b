//! Release commands: sync, env, build and the full deploy

use crate::context::Context;
use crate::output::{self, Field, OutputFormat};
use anyhow::Result;
use std::path::Path;

/// Upload `source` as a new release and make it live.
pub async fn sync(ctx: &Context, source: &Path, format: OutputFormat) -> Result<()> {
    let session = ctx.session().await?;
    let receipt = ctx.pipeline.sync().push(&session.host, source).await?;

    output::print_rows(
        vec![
            Field::new("release", &receipt.release),
            Field::new("digest", &receipt.digest),
            Field::new("files", receipt.files),
            Field::new("bytes", receipt.bytes),
            Field::new("path", &receipt.path),
        ],
        format,
    );
    Ok(())
}

/// Write the deployment configuration to the host, out of band.
pub async fn push_env(ctx: &Context) -> Result<()> {
    let session = ctx.session().await?;
    let config = ctx.stage_config(&session).await?;
    let path = ctx.pipeline.sync().push_env(&session.host, &config).await?;
    output::print_success(&format!(
        "Wrote {} (run mode {})",
        path, config.run_mode
    ));
    Ok(())
}

/// Build the image of the live release.
pub async fn build(ctx: &Context) -> Result<()> {
    let session = ctx.session().await?;
    let release = ctx.current_release(&session).await?;
    let context = ctx.pipeline.sync().layout().current();
    let image = session.lifecycle.build(&context, &release).await?;
    output::print_success(&format!("Built {}", image));
    Ok(())
}

/// Config, host, bootstrap, sync, build, replace and verify in one go.
pub async fn deploy(ctx: &Context, source: &Path, format: OutputFormat) -> Result<()> {
    let outcome = ctx.pipeline.deploy(source).await?;

    match format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "host": outcome.host,
            "release": outcome.release.release,
            "image": outcome.image,
            "instance": outcome.instance,
            "stage": outcome.stage,
            "health": outcome.health,
        })),
        OutputFormat::Table => {
            output::print_rows(
                vec![
                    Field::new("host", &outcome.host.name),
                    Field::new("release", &outcome.release.release),
                    Field::new("image", &outcome.image),
                    Field::new("container", outcome.instance.short_id()),
                    Field::new("run mode", outcome.instance.run_mode),
                    Field::new("stage", output::colored_stage(outcome.stage)),
                    Field::new("health", output::colored_health(outcome.health.status)),
                ],
                format,
            );
            for finding in &outcome.health.findings {
                output::print_warning(finding);
            }
        }
    }
    Ok(())
}
