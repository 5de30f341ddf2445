//! Health check command.
//!
//! Queries the admin `/health/live` and `/health/ready` endpoints.

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::client::AdminClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Only check liveness, not backend readiness
    #[arg(long)]
    live: bool,
}

pub async fn execute(
    args: HealthArgs,
    admin_url: &str,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let client = AdminClient::new(admin_url, timeout)?;
    let path = if args.live { "/health/live" } else { "/health/ready" };
    let (status, health) = client.get_raw(path).await?;

    let state = health
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    match format {
        OutputFormat::Table => println!(
            "{}",
            output::health_report(
                state,
                &[
                    ("Admin URL", Some(client.base_url())),
                    ("Backend", health.get("backend").and_then(|v| v.as_str())),
                    ("Error", health.get("error").and_then(|v| v.as_str())),
                ],
            )
        ),
        _ => println!("{}", output::document(&health, format)?),
    }

    if !status.is_success() {
        anyhow::bail!("journal is not ready ({})", status);
    }
    if matches!(format, OutputFormat::Table) {
        output::print_ok("Journal is healthy");
    }
    Ok(())
}
