//! Journal CLI - Command-line interface for the event journal.
//!
//! Appends events, reads streams and checks server health.

mod client;
mod commands;
mod output;

use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{append, health, read};
use output::OutputFormat;

/// Journal - append-only, per-stream versioned event log
#[derive(Parser)]
#[command(
    name = "journal",
    version,
    about = "Journal - append-only, per-stream versioned event log",
    long_about = "CLI for appending events to journal streams and reading them back.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// gRPC server URL
    #[arg(
        long,
        global = true,
        env = "JOURNAL_SERVER_URL",
        default_value = "http://localhost:9000"
    )]
    server: String,

    /// Admin HTTP URL
    #[arg(
        long,
        global = true,
        env = "JOURNAL_ADMIN_URL",
        default_value = "http://localhost:9001"
    )]
    admin_url: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append one event to a stream
    Append(append::AppendArgs),

    /// Print every event of a stream
    Read(read::ReadArgs),

    /// Check server health
    Health(health::HealthArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let timeout = Duration::from_secs(cli.timeout);
    let format = cli.output;

    let result = match cli.command {
        Commands::Append(args) => append::execute(args, &cli.server, timeout, format).await,
        Commands::Read(args) => read::execute(args, &cli.server, timeout, format).await,
        Commands::Health(args) => health::execute(args, &cli.admin_url, timeout, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
