//! Ingest pipeline — what a lane worker does with one datagram.
//!
//! parse → filter to target services → record into the rate aggregator.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{Instrument, debug, debug_span};

use edgescale_core::TargetServices;
use edgescale_ingress::IngressParser;
use edgescale_metrics::RateAggregator;

use crate::dispatcher::DatagramHandler;

/// Running totals across all lanes.
#[derive(Debug, Default)]
pub struct PipelineStats {
    datagrams: AtomicU64,
    events: AtomicU64,
    malformed: AtomicU64,
    filtered: AtomicU64,
}

impl PipelineStats {
    /// Datagrams processed.
    pub fn datagrams(&self) -> u64 {
        self.datagrams.load(Ordering::Relaxed)
    }

    /// Events recorded into the aggregator.
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Lines skipped as unparseable.
    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Well-formed lines dropped for non-target services.
    pub fn filtered(&self) -> u64 {
        self.filtered.load(Ordering::Relaxed)
    }
}

pub struct IngestPipeline {
    parser: IngressParser,
    targets: TargetServices,
    aggregator: Arc<RateAggregator>,
    stats: PipelineStats,
}

impl IngestPipeline {
    pub fn new(parser: IngressParser, targets: TargetServices, aggregator: Arc<RateAggregator>) -> Self {
        Self {
            parser,
            targets,
            aggregator,
            stats: PipelineStats::default(),
        }
    }

    /// Parse one datagram and record its target-service events.
    ///
    /// Returns the number of events recorded.
    pub async fn process(&self, datagram: &[u8]) -> usize {
        let parsed = self.parser.parse(datagram, &self.targets);
        let (malformed, filtered) = (parsed.malformed, parsed.filtered);

        let mut recorded = 0;
        for event in parsed {
            if self.aggregator.record(&event) {
                recorded += 1;
            }
        }

        self.stats.datagrams.fetch_add(1, Ordering::Relaxed);
        self.stats.events.fetch_add(recorded as u64, Ordering::Relaxed);
        self.stats.malformed.fetch_add(malformed as u64, Ordering::Relaxed);
        self.stats.filtered.fetch_add(filtered as u64, Ordering::Relaxed);

        if malformed > 0 {
            debug!(malformed, recorded, "datagram had malformed lines");
        }
        recorded
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn aggregator(&self) -> &Arc<RateAggregator> {
        &self.aggregator
    }
}

#[async_trait]
impl DatagramHandler for IngestPipeline {
    async fn handle(&self, lane: usize, datagram: Bytes) {
        let span = debug_span!("worker", lane, bytes = datagram.len());
        self.process(&datagram).instrument(span).await;
    }
}
