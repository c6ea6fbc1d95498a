//! edgescale-metrics — per-service request rates.
//!
//! Counts access events per target service in tumbling windows and
//! publishes the finalized rate of each window for the autoscaler and
//! for observability.
//!
//! # Architecture
//!
//! ```text
//! RateAggregator
//!   ├── record()   ← called by every dispatcher lane, lock-free, O(1) per service
//!   ├── rotate()   → finalizes the open window: rate = count / window_secs
//!   ├── snapshot() → service → rate of the last finalized window
//!   └── run()      → window ticker
//!
//! TelemetryReporter
//!   └── run() → logs the latest window periodically (read-only)
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod aggregator;
pub mod prometheus;
pub mod reporter;

pub use aggregator::{RateAggregator, RateWindow, ServiceRate};
pub use prometheus::render_prometheus;
pub use reporter::TelemetryReporter;
