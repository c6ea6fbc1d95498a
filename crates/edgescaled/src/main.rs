//! edgescaled — access-log driven autoscaler.
//!
//! # Usage
//!
//! ```text
//! edgescaled --config /etc/edgescale/edgescale.toml --metrics-port 9102
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::net::{TcpListener, UdpSocket};
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::EnvFilter;

use edgescale_autoscale::DryRunOrchestrator;
use edgescale_core::SystemClock;
use edgescale_core::config::Settings;
use edgescaled::{DEFAULT_LOG_FILTER, Edgescale};

#[derive(Parser)]
#[command(name = "edgescaled", about = "edgescale daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "./edgescale.toml")]
    config: PathBuf,

    /// Service name recorded on the root span.
    #[arg(long, default_value = "edgescale")]
    svc: String,

    /// Serve /metrics and /healthz on this port.
    #[arg(long)]
    metrics_port: Option<u16>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let span = info_span!("edgescaled", svc = %cli.svc);

    let settings = match Settings::load(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            span.in_scope(|| {
                error!(config = %cli.config.display(), error = %e, "invalid configuration");
            });
            std::process::exit(1);
        }
    };

    run(settings, cli.metrics_port).instrument(span).await
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn run(settings: Settings, metrics_port: Option<u16>) -> anyhow::Result<()> {
    info!(ingress = %settings.ingress, "edgescale daemon starting");

    let socket = UdpSocket::bind(settings.listen.addr()).await?;

    let metrics = match metrics_port {
        Some(port) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            Some(TcpListener::bind(addr).await?)
        }
        None => None,
    };

    // No cluster client ships with the daemon; scale actions are logged only.
    let orchestrator = Arc::new(DryRunOrchestrator::new(settings.autoscale.min_replicas));
    let app = Edgescale::new(settings, orchestrator, Arc::new(SystemClock));

    app.run(socket, metrics, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
    })
    .await
}
