//! Prometheus text exposition format.
//!
//! Renders the latest rate window into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use crate::aggregator::RateWindow;

/// Render a rate window into Prometheus text format.
///
/// Produces GAUGE metrics with `service` labels. `None` (no finalized
/// window yet) still yields the type declarations.
pub fn render_prometheus(window: Option<&RateWindow>) -> String {
    let mut out = String::new();
    let services: Vec<_> = window
        .map(|w| w.services.values().collect())
        .unwrap_or_default();

    out.push_str("# HELP edgescale_requests_per_second Request rate over the last finalized window.\n");
    out.push_str("# TYPE edgescale_requests_per_second gauge\n");
    for s in &services {
        let _ = writeln!(
            out,
            "edgescale_requests_per_second{{service=\"{}\"}} {:.2}",
            s.service, s.rate
        );
    }

    out.push_str("# HELP edgescale_window_requests Requests counted in the last finalized window.\n");
    out.push_str("# TYPE edgescale_window_requests gauge\n");
    for s in &services {
        let _ = writeln!(
            out,
            "edgescale_window_requests{{service=\"{}\"}} {}",
            s.service, s.requests
        );
    }

    out.push_str("# HELP edgescale_error_rate Fraction of 5xx responses (0.0-1.0).\n");
    out.push_str("# TYPE edgescale_error_rate gauge\n");
    for s in &services {
        let _ = writeln!(
            out,
            "edgescale_error_rate{{service=\"{}\"}} {:.4}",
            s.service, s.error_rate
        );
    }

    out.push_str("# HELP edgescale_latency_p50_ms P50 upstream latency in milliseconds.\n");
    out.push_str("# TYPE edgescale_latency_p50_ms gauge\n");
    for s in &services {
        let _ = writeln!(
            out,
            "edgescale_latency_p50_ms{{service=\"{}\"}} {:.2}",
            s.service, s.latency_p50_ms
        );
    }

    out.push_str("# HELP edgescale_latency_p99_ms P99 upstream latency in milliseconds.\n");
    out.push_str("# TYPE edgescale_latency_p99_ms gauge\n");
    for s in &services {
        let _ = writeln!(
            out,
            "edgescale_latency_p99_ms{{service=\"{}\"}} {:.2}",
            s.service, s.latency_p99_ms
        );
    }

    out
}
