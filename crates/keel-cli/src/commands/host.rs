//! Host commands

use crate::context::Context;
use crate::output::{self, Field, OutputFormat};
use anyhow::Result;

/// Create or reuse the host.
pub async fn provision(ctx: &Context, format: OutputFormat) -> Result<()> {
    let session = ctx.session().await?;
    let host = &session.host;

    match format {
        OutputFormat::Json => output::print_json(host),
        OutputFormat::Table => {
            output::print_rows(
                vec![
                    Field::new("name", &host.name),
                    Field::new("id", &host.id),
                    Field::new("zone", &host.zone),
                    Field::new("address", host.external_ip.as_deref().unwrap_or("-")),
                    Field::new("tags", host.tags.join(", ")),
                ],
                format,
            );
            match &host.external_ip {
                Some(ip) => output::print_info(&format!(
                    "Add {} to the exchange API key's IP allow-list",
                    ip
                )),
                None => output::print_warning("Host has no external address"),
            }
        }
    }
    Ok(())
}

/// Install the container runtime and create the remote directories.
pub async fn bootstrap(ctx: &Context) -> Result<()> {
    let session = ctx.session().await?;
    let dirs = ctx.pipeline.sync().layout().base_dirs();
    let outcome = ctx
        .pipeline
        .provisioner()
        .bootstrap_runtime(ctx.pipeline.shell(), &session.host, &dirs)
        .await?;

    if outcome.installed {
        output::print_success(&format!("Installed {}", outcome.runtime_version));
    } else {
        output::print_success(&format!("Runtime present: {}", outcome.runtime_version));
    }
    Ok(())
}
