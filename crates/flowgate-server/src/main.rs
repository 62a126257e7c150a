#![warn(missing_docs)]

//! FlowGate admission-gated TCP server

use clap::Parser;
use flowgate_server::server::report_metrics;
use flowgate_server::{GateServer, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "flowgate", about = "Line echo server behind concurrency and rate admission control")]
struct Args {
    /// Path to a TOML or JSON config file.
    #[arg(short, long, env = "FLOWGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the configured listen address.
    #[arg(short, long, env = "FLOWGATE_BIND")]
    bind: Option<SocketAddr>,

    /// Overrides the configured in-flight cap.
    #[arg(long)]
    max_concurrency: Option<u32>,

    /// Overrides the configured per-window cap.
    #[arg(long)]
    max_requests_per_window: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(max) = args.max_concurrency {
        config.admission.max_concurrency = Some(max);
    }
    if let Some(max) = args.max_requests_per_window {
        config.admission.max_requests_per_window = max;
    }

    let server = GateServer::from_config(&config)?;
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "FlowGate server listening");

    let reporter = config
        .metrics_interval()
        .map(|period| tokio::spawn(report_metrics(server.controller().clone(), period)));

    tokio::select! {
        result = server.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown requested"),
    }

    if let Some(reporter) = reporter {
        reporter.abort();
    }
    let snapshot = server.controller().metrics();
    tracing::info!(snapshot = %serde_json::to_string(&snapshot)?, "final admission metrics");
    print!("{}", snapshot.to_prometheus());

    Ok(())
}
