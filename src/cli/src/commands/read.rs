//! Read command.

use std::time::Duration;

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Args;
use journal_core::api::grpc::proto::Event;
use serde::Serialize;
use tabled::Tabled;

use crate::client::JournalRpc;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ReadArgs {
    /// Stream identifier
    stream: String,
}

/// One event as displayed.
#[derive(Debug, Serialize, Tabled)]
pub struct EventRow {
    #[tabled(rename = "Version")]
    version: i64,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Encoding")]
    encoding: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Payload")]
    payload: String,
    #[tabled(skip)]
    payload_encoding: &'static str,
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "ID")]
    id: String,
}

impl From<Event> for EventRow {
    fn from(event: Event) -> Self {
        let (payload, payload_encoding) = render_payload(event.payload);
        Self {
            version: event.version,
            kind: event.kind,
            encoding: event.encoding,
            source: event.source,
            payload,
            payload_encoding,
            timestamp: event.timestamp,
            id: event.id,
        }
    }
}

/// UTF-8 text when valid, base64 otherwise.
fn render_payload(payload: Vec<u8>) -> (String, &'static str) {
    match String::from_utf8(payload) {
        Ok(text) => (text, "utf8"),
        Err(err) => (STANDARD.encode(err.into_bytes()), "base64"),
    }
}

pub async fn execute(
    args: ReadArgs,
    server: &str,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let mut client = JournalRpc::connect(server, timeout).await?;
    let rows: Vec<EventRow> = client
        .read(&args.stream)
        .await?
        .into_iter()
        .map(EventRow::from)
        .collect();

    let rendered = match format {
        OutputFormat::Table => output::events_table(&args.stream, &rows),
        _ => output::document(&rows, format)?,
    };
    println!("{}", rendered);
    Ok(())
}
