//! Rate aggregator — tumbling-window request counting per target service.
//!
//! Recording is lock-free and O(1): one packed atomic for the request and
//! error counts plus a fixed latency histogram per service. The set of
//! counters is fixed when the aggregator is built, so recording never takes a
//! map-wide lock and no counter can ever appear for a service outside the
//! target set. Per-window state does not grow with traffic.
//!
//! Finalized windows are published as one immutable [`RateWindow`] that is
//! swapped in whole, so readers never observe a half-rotated state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use edgescale_core::{AccessEvent, Clock, TargetServices};

/// Upper bounds (microseconds) of the latency histogram buckets. One more
/// bucket catches everything above the last bound.
pub const LATENCY_BOUNDS_US: [u64; 14] = [
    1_000, 2_000, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 500_000, 1_000_000,
    2_500_000, 5_000_000, 10_000_000, 30_000_000,
];

const LATENCY_BUCKETS: usize = LATENCY_BOUNDS_US.len() + 1;

/// Requests live in the low half of the packed count, errors in the high half.
const REQUEST_MASK: u64 = u32::MAX as u64;
const ERROR_ONE: u64 = 1 << 32;

/// Per-service counters for the open window.
struct RateCounter {
    /// Requests (low 32 bits) and 5xx responses (high 32 bits) since the last
    /// rotation. Packed so one swap takes both, and an event is never split
    /// across two windows.
    counts: AtomicU64,
    /// Latency histogram since the last rotation.
    latency: [AtomicU64; LATENCY_BUCKETS],
}

impl RateCounter {
    fn new() -> Self {
        Self {
            counts: AtomicU64::new(0),
            latency: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn requests(&self) -> u64 {
        self.counts.load(Ordering::Relaxed) & REQUEST_MASK
    }

    /// Take the open-window counts, leaving zeros behind.
    ///
    /// Request and error counts are taken together. A latency sample recorded
    /// during the swap may land in the neighbouring window.
    fn take(&self) -> (u64, u64, [u64; LATENCY_BUCKETS]) {
        let packed = self.counts.swap(0, Ordering::AcqRel);
        let histogram = std::array::from_fn(|i| self.latency[i].swap(0, Ordering::AcqRel));
        (packed & REQUEST_MASK, packed >> 32, histogram)
    }
}

/// Histogram bucket for a latency sample.
fn latency_bucket(latency: Duration) -> usize {
    let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
    LATENCY_BOUNDS_US.partition_point(|&bound| bound < us)
}

/// Finalized figures for one service over one window.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRate {
    pub service: String,
    /// Requests counted in the window.
    pub requests: u64,
    /// Requests per second: `requests / window_secs`.
    pub rate: f64,
    /// Fraction of requests that were 5xx (0.0-1.0).
    pub error_rate: f64,
    /// Upper bound of the histogram bucket holding the median, in ms.
    pub latency_p50_ms: f64,
    /// Upper bound of the histogram bucket holding the 99th percentile, in ms.
    pub latency_p99_ms: f64,
}

/// One finalized tumbling window across all target services.
#[derive(Debug, Clone)]
pub struct RateWindow {
    /// Rotation counter, starting at 1 for the first finalized window.
    pub sequence: u64,
    pub window_start: Instant,
    pub window_end: Instant,
    /// Nominal window length used as the rate denominator.
    pub duration: Duration,
    pub services: BTreeMap<String, ServiceRate>,
}

impl RateWindow {
    pub fn rate(&self, service: &str) -> Option<f64> {
        self.services.get(service).map(|s| s.rate)
    }
}

/// Open-window bookkeeping, only touched by `rotate`.
struct OpenWindow {
    start: Instant,
    sequence: u64,
}

/// Aggregates access events into per-service request rates.
pub struct RateAggregator {
    /// Per-service counters: service → counter. Fixed at construction.
    counters: HashMap<String, RateCounter>,
    /// Window length.
    window: Duration,
    clock: Arc<dyn Clock>,
    open: Mutex<OpenWindow>,
    /// Most recently finalized window.
    latest: RwLock<Option<Arc<RateWindow>>>,
}

impl RateAggregator {
    /// Create an aggregator tracking every service in `targets`.
    pub fn new(targets: &TargetServices, window: Duration, clock: Arc<dyn Clock>) -> Self {
        let counters = targets
            .iter()
            .map(|s| (s.to_string(), RateCounter::new()))
            .collect();
        let start = clock.now();

        Self {
            counters,
            window,
            clock,
            open: Mutex::new(OpenWindow { start, sequence: 0 }),
            latest: RwLock::new(None),
        }
    }

    /// Record one access event in the open window.
    ///
    /// Returns `false` (and records nothing) for a service that is not tracked.
    pub fn record(&self, event: &AccessEvent) -> bool {
        let Some(counter) = self.counters.get(&event.service) else {
            return false;
        };

        let delta = if event.is_error() { 1 + ERROR_ONE } else { 1 };
        counter.counts.fetch_add(delta, Ordering::Relaxed);
        if let Some(latency) = event.latency {
            counter.latency[latency_bucket(latency)].fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Close the open window, publish its rates, and start a new one.
    pub async fn rotate(&self) -> Arc<RateWindow> {
        let mut open = self.open.lock().await;
        // Never move the window start backwards.
        let now = self.clock.now().max(open.start);
        let window_secs = self.window.as_secs_f64();

        let mut services = BTreeMap::new();
        for (service, counter) in &self.counters {
            let (requests, errors, histogram) = counter.take();

            let error_rate = if requests > 0 {
                errors as f64 / requests as f64
            } else {
                0.0
            };
            let (p50, p99) = histogram_percentiles(&histogram);

            services.insert(
                service.clone(),
                ServiceRate {
                    service: service.clone(),
                    requests,
                    rate: requests as f64 / window_secs,
                    error_rate,
                    latency_p50_ms: p50,
                    latency_p99_ms: p99,
                },
            );
        }

        open.sequence += 1;
        let window = Arc::new(RateWindow {
            sequence: open.sequence,
            window_start: open.start,
            window_end: now,
            duration: self.window,
            services,
        });
        open.start = now;

        *self.latest.write().await = Some(Arc::clone(&window));
        drop(open);

        debug!(
            sequence = window.sequence,
            services = window.services.len(),
            "rate window finalized"
        );
        window
    }

    /// Rates of the most recently finalized window: service → requests/sec.
    ///
    /// Empty until the first rotation.
    pub async fn snapshot(&self) -> HashMap<String, f64> {
        match self.latest.read().await.as_ref() {
            Some(window) => window
                .services
                .iter()
                .map(|(service, s)| (service.clone(), s.rate))
                .collect(),
            None => HashMap::new(),
        }
    }

    /// The most recently finalized window, if any.
    pub async fn latest(&self) -> Option<Arc<RateWindow>> {
        self.latest.read().await.clone()
    }

    /// Requests counted so far in the open window (without resetting).
    pub fn current_count(&self, service: &str) -> u64 {
        self.counters
            .get(service)
            .map(RateCounter::requests)
            .unwrap_or(0)
    }

    pub fn is_tracked(&self, service: &str) -> bool {
        self.counters.contains_key(service)
    }

    /// Tracked services, sorted.
    pub fn tracked_services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.counters.keys().cloned().collect();
        services.sort();
        services
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Rotate once per window until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            window_ms = self.window.as_millis() as u64,
            services = self.counters.len(),
            "rate aggregator started"
        );

        let first = tokio::time::Instant::now() + self.window;
        let mut ticker = tokio::time::interval_at(first, self.window);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.rotate().await;
                }
                _ = shutdown.changed() => {
                    info!("rate aggregator shutting down");
                    break;
                }
            }
        }
    }
}

/// P50 and P99 in milliseconds, read from histogram bucket counts.
///
/// Each percentile is the upper bound of the bucket holding that rank; the
/// overflow bucket reports the last finite bound. Empty gives (0.0, 0.0).
fn histogram_percentiles(histogram: &[u64; LATENCY_BUCKETS]) -> (f64, f64) {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return (0.0, 0.0);
    }

    let at = |q: f64| {
        let rank = ((total as f64 * q) as u64).min(total - 1);
        let mut seen = 0;
        for (i, &count) in histogram.iter().enumerate() {
            seen += count;
            if seen > rank {
                let bound = LATENCY_BOUNDS_US[i.min(LATENCY_BOUNDS_US.len() - 1)];
                return bound as f64 / 1000.0;
            }
        }
        LATENCY_BOUNDS_US[LATENCY_BOUNDS_US.len() - 1] as f64 / 1000.0
    };

    (at(0.50), at(0.99))
}
