//! Journal Server - Main entry point
//!
//! Serves the journal over gRPC, with an admin HTTP surface for health
//! probes and metrics, on the storage backend selected by configuration.

use std::net::SocketAddr;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use journal_core::{
    api::{serve_admin, serve_grpc, AdminState, GrpcServerConfig},
    config::{Config, Driver},
    journal::Journal,
    observability, storage,
};

/// Event journal server.
#[derive(Parser, Debug)]
#[command(name = "journal-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "JOURNAL_CONFIG")]
    config: Option<String>,

    /// Storage backend
    #[arg(long, value_enum)]
    driver: Option<Driver>,

    /// Database connection string
    #[arg(long)]
    db_url: Option<String>,

    /// gRPC listen address
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,

    /// Admin HTTP listen address
    #[arg(long)]
    admin_addr: Option<SocketAddr>,
}

impl Args {
    /// Flags given on the command line, as configuration overrides.
    fn overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(driver) = self.driver {
            overrides.push(("database.driver", driver.as_str().to_string()));
        }
        if let Some(url) = &self.db_url {
            overrides.push(("database.url", url.clone()));
        }
        if let Some(addr) = self.grpc_addr {
            overrides.push(("server.grpc_addr", addr.to_string()));
        }
        if let Some(addr) = self.admin_addr {
            overrides.push(("server.admin_addr", addr.to_string()));
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::load_with(args.config.as_deref(), &args.overrides())?;

    // Initialize observability
    observability::init("journal-server", &config.observability)?;
    let metrics = if config.observability.metrics_enabled {
        Some(observability::metrics::install()?)
    } else {
        None
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        driver = config.database.driver.as_str(),
        "Starting journal server"
    );

    let backend = storage::connect(&config.database).await?;
    let journal = Journal::new(backend.clone());

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let grpc = serve_grpc(
        GrpcServerConfig::from(&config.server),
        journal,
        shutdown.clone().cancelled_owned(),
    );
    let admin = serve_admin(
        config.server.admin_addr,
        AdminState::new(backend, metrics),
        shutdown.clone().cancelled_owned(),
    );

    let result = tokio::try_join!(
        async { grpc.await.map_err(anyhow::Error::from) },
        async { admin.await.map_err(anyhow::Error::from) },
    );

    // Cleanup
    observability::shutdown();
    tracing::info!("Server shutdown complete");

    result.map(|_| ())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
