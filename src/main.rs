//! UDP packet engine
//!
//! # Modes
//! - **server**: batched single-threaded event loop answering text commands
//! - **loadtest**: paced multi-threaded PING generator with loss/RTT report

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use udp_engine::infrastructure::api;
use udp_engine::infrastructure::logging::init_logging;
use udp_engine::{Config, LoadTestClient, LoadTestConfig, Server};

#[derive(Parser, Debug)]
#[command(name = "udp-engine")]
#[command(about = "High-throughput UDP packet engine and load generator")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $CONFIG_PATH or ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the packet server
    Server {
        port: u16,

        /// Serve /api/stats and /api/health on this TCP port
        #[arg(long)]
        api_port: Option<u16>,
    },

    /// Run the load generator against a server
    Loadtest {
        host: String,
        port: u16,
        threads: usize,
        /// Aggregate packets per second across all threads
        pps: u64,
        duration_seconds: u64,

        /// Per-packet response timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

/// A missing file yields defaults; a malformed or invalid one is an error
fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Config::load().context("failed to load config"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    let _guards = init_logging(&config.logging).context("failed to initialize logging")?;

    match cli.mode {
        Mode::Server { port, api_port } => run_server(config, port, api_port).await,
        Mode::Loadtest {
            host,
            port,
            threads,
            pps,
            duration_seconds,
            timeout_ms,
        } => {
            let mut load = LoadTestConfig::new(
                host,
                port,
                threads,
                pps,
                Duration::from_secs(duration_seconds),
            )
            .with_settings(&config.loadtest);
            if let Some(ms) = timeout_ms {
                load = load.with_response_timeout(Duration::from_millis(ms));
            }
            run_loadtest(load).await
        }
    }
}

async fn run_server(config: Config, port: u16, api_port: Option<u16>) -> anyhow::Result<()> {
    // Returning the error exits with status 1 after logs are flushed
    let server = Server::bind(config.server.clone(), port).map_err(|e| {
        tracing::error!("{}", e);
        e
    })?;
    let handle = server.handle();

    if let Some(api_port) = api_port.or(config.server.api_port) {
        let api_handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = api::start_server(api_handle, api_port).await {
                tracing::error!("API Server failed: {}", e);
            }
        });
    }

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, stopping server");
                signal_handle.stop();
            }
            Err(e) => tracing::warn!("failed to listen for Ctrl-C: {}", e),
        }
    });

    let snapshot = tokio::task::spawn_blocking(move || server.run())
        .await
        .context("event loop panicked")??;

    println!("{}", snapshot);
    Ok(())
}

async fn run_loadtest(load: LoadTestConfig) -> anyhow::Result<()> {
    let client = LoadTestClient::new(load)?;
    let report = tokio::task::spawn_blocking(move || client.run())
        .await
        .context("load generator panicked")??;

    println!("{}", report);
    Ok(())
}
