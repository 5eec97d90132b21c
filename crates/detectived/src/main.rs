//! detectived: the detective daemon.
//!
//! Hosts one aggregation node described by a TOML file and serves its
//! health report over HTTP.
//!
//! # Usage
//!
//! ```text
//! detectived serve --config /etc/detective/detective.toml
//! detectived check --config /etc/detective/detective.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use detectived::DetectiveConfig;

#[derive(Parser)]
#[command(name = "detectived", about = "Detective health aggregation daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the node's health report over HTTP.
    Serve {
        /// Path to the node config file.
        #[arg(long, short)]
        config: PathBuf,

        /// Override the listen address from the config file.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Run a single query, print the JSON report and exit non-zero if unhealthy.
    Check {
        /// Path to the node config file.
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,detectived=debug,detective=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, listen } => {
            run_serve(config, listen).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { config } => run_check(config).await,
    }
}

async fn run_serve(config_path: PathBuf, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    let config = DetectiveConfig::from_file(&config_path)?;
    info!(path = ?config_path, node = %config.node.name, "config loaded");

    let detective = Arc::new(config.build()?);
    let router = detective::router_at(config.path(), detective);
    let addr = listen.unwrap_or_else(|| config.listen_addr());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, path = %config.path(), "query surface listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("detective daemon stopped");
    Ok(())
}

async fn run_check(config_path: PathBuf) -> anyhow::Result<ExitCode> {
    let config = DetectiveConfig::from_file(&config_path)?;
    let detective = config.build()?;

    let state = detective.query_state().await;
    println!("{}", serde_json::to_string_pretty(&state)?);

    if state.is_healthy() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
