//! edgescaled — the edgescale daemon.
//!
//! Assembles the subsystems into one process:
//! - UDP listener → dispatcher lanes → ingest pipeline
//! - Rate aggregator window ticker
//! - Telemetry reporter
//! - Autoscaler
//! - Optional HTTP endpoint (`/metrics`, `/healthz`)
//!
//! # Shutdown
//!
//! ```text
//! stop signal → listener stops → dispatcher drains lanes
//!             → final window rotated → periodic tasks signalled
//!             → tasks joined
//! ```

pub mod http;
pub mod listener;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tracing::{Instrument, debug, info, warn};

use edgescale_autoscale::{Autoscaler, Orchestrator, ScalePolicy};
use edgescale_core::Clock;
use edgescale_core::config::Settings;
use edgescale_dispatch::{Dispatcher, IngestPipeline};
use edgescale_ingress::IngressParser;
use edgescale_metrics::{RateAggregator, TelemetryReporter};

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,edgescaled=debug,edgescale=debug";

/// All long-lived components, wired from validated settings.
pub struct Edgescale {
    settings: Settings,
    aggregator: Arc<RateAggregator>,
    pipeline: Arc<IngestPipeline>,
    reporter: Arc<TelemetryReporter>,
    autoscaler: Arc<Autoscaler>,
}

impl Edgescale {
    pub fn new(settings: Settings, orchestrator: Arc<dyn Orchestrator>, clock: Arc<dyn Clock>) -> Self {
        let auto = &settings.autoscale;

        let aggregator = Arc::new(RateAggregator::new(
            &auto.targets,
            auto.window,
            Arc::clone(&clock),
        ));
        let pipeline = Arc::new(IngestPipeline::new(
            IngressParser::new(settings.ingress),
            auto.targets.clone(),
            Arc::clone(&aggregator),
        ));
        let reporter = Arc::new(TelemetryReporter::new(
            Arc::clone(&aggregator),
            aggregator.window(),
        ));
        let autoscaler = Arc::new(Autoscaler::new(
            auto.targets.clone(),
            Arc::clone(&aggregator),
            orchestrator,
            ScalePolicy::from(auto),
            clock,
        ));

        Self {
            settings,
            aggregator,
            pipeline,
            reporter,
            autoscaler,
        }
    }

    pub fn aggregator(&self) -> &Arc<RateAggregator> {
        &self.aggregator
    }

    pub fn pipeline(&self) -> &Arc<IngestPipeline> {
        &self.pipeline
    }

    pub fn autoscaler(&self) -> &Arc<Autoscaler> {
        &self.autoscaler
    }

    pub fn router(&self) -> Router {
        http::build_router(Arc::clone(&self.aggregator))
    }

    /// Run until `stop` resolves, then shut down in order.
    pub async fn run<F>(self, socket: UdpSocket, metrics: Option<TcpListener>, stop: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let dispatcher = Dispatcher::start(self.settings.dispatch, Arc::clone(&self.pipeline))?;

        // ── Background tasks ───────────────────────────────────

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        let aggregator = Arc::clone(&self.aggregator);
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(
            async move { aggregator.run(rx).await }.in_current_span(),
        ));

        let reporter = Arc::clone(&self.reporter);
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(
            async move { reporter.run(rx).await }.in_current_span(),
        ));

        let autoscaler = Arc::clone(&self.autoscaler);
        let interval = self.settings.autoscale.evaluate_interval;
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(
            async move { autoscaler.run(interval, rx).await }.in_current_span(),
        ));

        if let Some(listener) = metrics {
            let router = self.router();
            let mut rx = shutdown_rx.clone();
            let addr = listener.local_addr()?;
            info!(%addr, "metrics endpoint starting");
            handles.push(tokio::spawn(
                async move {
                    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
                        let _ = rx.changed().await;
                    });
                    if let Err(e) = server.await {
                        warn!(error = %e, "metrics endpoint failed");
                    }
                }
                .in_current_span(),
            ));
        }

        info!(
            ingress = %self.settings.ingress,
            listen = %self.settings.listen.addr(),
            services = self.settings.autoscale.targets.len(),
            lanes = dispatcher.pool_size(),
            queue_depth = dispatcher.queue_depth(),
            "edgescale running"
        );

        // ── Ingest until stopped ───────────────────────────────

        listener::serve(&socket, &dispatcher, stop).await;
        drop(socket);

        dispatcher.shutdown().await;
        // Finalize what the lanes drained so the last report includes it.
        let last = self.aggregator.rotate().await;
        debug!(sequence = last.sequence, "final window finalized");
        let _ = shutdown_tx.send(true);

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }

        let stats = self.pipeline.stats();
        info!(
            datagrams = stats.datagrams(),
            events = stats.events(),
            malformed = stats.malformed(),
            filtered = stats.filtered(),
            "edgescale stopped"
        );
        Ok(())
    }
}
