//! Telemetry reporter — periodic, read-only logging of request rates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::aggregator::{RateAggregator, RateWindow};

/// Logs the latest finalized window on a fixed interval.
///
/// Only reads from the aggregator; never rotates or records.
pub struct TelemetryReporter {
    aggregator: Arc<RateAggregator>,
    interval: Duration,
}

impl TelemetryReporter {
    pub fn new(aggregator: Arc<RateAggregator>, interval: Duration) -> Self {
        Self {
            aggregator,
            interval,
        }
    }

    /// Emit one structured event per service for the latest window.
    pub async fn report_once(&self) -> Option<Arc<RateWindow>> {
        let Some(window) = self.aggregator.latest().await else {
            debug!("no finalized rate window yet");
            return None;
        };

        for s in window.services.values() {
            info!(
                service = %s.service,
                window = window.sequence,
                requests = s.requests,
                qps = s.rate,
                error_rate = s.error_rate,
                p50_ms = s.latency_p50_ms,
                p99_ms = s.latency_p99_ms,
                "request rate"
            );
        }
        Some(window)
    }

    /// Run the reporting loop until shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "telemetry reporter started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.report_once().await;
                }
                _ = shutdown.changed() => {
                    info!("telemetry reporter shutting down");
                    // Final report before exit.
                    self.report_once().await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgescale_core::{AccessEvent, ManualClock, TargetServices};

    fn setup() -> Arc<RateAggregator> {
        let targets = TargetServices::new(["checkout"]).unwrap();
        Arc::new(RateAggregator::new(
            &targets,
            Duration::from_secs(1),
            Arc::new(ManualClock::new()),
        ))
    }

    #[tokio::test]
    async fn report_before_first_window_is_empty() {
        let reporter = TelemetryReporter::new(setup(), Duration::from_secs(1));
        assert!(reporter.report_once().await.is_none());
    }

    #[tokio::test]
    async fn report_does_not_mutate_aggregator() {
        let agg = setup();
        for _ in 0..4 {
            agg.record(&AccessEvent::new("checkout", 0));
        }
        agg.rotate().await;
        agg.record(&AccessEvent::new("checkout", 0));

        let reporter = TelemetryReporter::new(Arc::clone(&agg), Duration::from_secs(1));
        let reported = reporter.report_once().await.unwrap();
        let again = reporter.report_once().await.unwrap();

        assert_eq!(reported.sequence, again.sequence);
        assert_eq!(reported.rate("checkout"), Some(4.0));
        // Open-window count untouched by reporting.
        assert_eq!(agg.current_count("checkout"), 1);
        assert_eq!(agg.latest().await.unwrap().sequence, 1);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let reporter = TelemetryReporter::new(setup(), Duration::from_secs(3600));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { reporter.run(rx).await });
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
