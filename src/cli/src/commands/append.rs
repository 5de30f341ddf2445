//! Append command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use journal_core::api::grpc::proto::AppendEventRequest;
use serde::Serialize;

use crate::client::JournalRpc;
use crate::output::{self, OutputFormat};

#[derive(Args)]
#[command(group(ArgGroup::new("payload").required(true).args(["data", "file"])))]
pub struct AppendArgs {
    /// Stream identifier
    stream: String,

    /// Version the stream is expected to be at (0 creates it)
    #[arg(short = 'e', long)]
    expected_version: i64,

    /// Event type
    #[arg(short, long)]
    kind: String,

    /// Payload format tag
    #[arg(long, default_value = "")]
    encoding: String,

    /// Producer identifier
    #[arg(long, default_value = "journal-cli")]
    source: String,

    /// Payload given inline
    #[arg(short, long)]
    data: Option<String>,

    /// Payload read from a file
    #[arg(short, long)]
    file: Option<PathBuf>,
}

#[derive(Serialize)]
struct AppendOutput<'a> {
    stream_id: &'a str,
    assigned_version: i64,
}

impl AppendArgs {
    fn payload(&self) -> Result<Vec<u8>> {
        match (&self.data, &self.file) {
            (Some(data), _) => Ok(data.clone().into_bytes()),
            (None, Some(path)) => std::fs::read(path)
                .with_context(|| format!("Failed to read payload from {}", path.display())),
            (None, None) => anyhow::bail!("either --data or --file is required"),
        }
    }
}

pub async fn execute(
    args: AppendArgs,
    server: &str,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let request = AppendEventRequest {
        payload: args.payload()?,
        stream_id: args.stream.clone(),
        expected_version: args.expected_version,
        kind: args.kind,
        encoding: args.encoding,
        source: args.source,
    };

    let mut client = JournalRpc::connect(server, timeout).await?;
    let assigned_version = client.append(request).await?;

    match format {
        OutputFormat::Table => output::print_ok(&format!(
            "Appended to {} at version {}",
            args.stream, assigned_version
        )),
        _ => println!(
            "{}",
            output::document(
                &AppendOutput {
                    stream_id: &args.stream,
                    assigned_version,
                },
                format,
            )?
        ),
    }

    Ok(())
}
