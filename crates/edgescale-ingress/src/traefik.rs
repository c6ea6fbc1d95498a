//! Traefik JSON access logs (`--accesslog.format=json`).

use std::time::Duration;

use chrono::DateTime;
use serde::Deserialize;

use edgescale_core::AccessEvent;

use crate::error::ParseError;
use crate::{number_or_string, status_code};

#[derive(Debug, Deserialize)]
struct TraefikLine {
    #[serde(rename = "ServiceName", default)]
    service_name: Option<String>,
    #[serde(rename = "StartUTC", default)]
    start_utc: Option<String>,
    #[serde(rename = "DownstreamStatus", default, deserialize_with = "number_or_string")]
    downstream_status: Option<f64>,
    /// Nanoseconds.
    #[serde(rename = "Duration", default, deserialize_with = "number_or_string")]
    duration: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TraefikParser;

impl TraefikParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_line(&self, line: &str) -> Result<AccessEvent, ParseError> {
        // Shippers may prepend a syslog header.
        let start = line.find('{').ok_or(ParseError::NoPayload)?;
        let raw: TraefikLine = serde_json::from_str(&line[start..])?;

        let service = raw
            .service_name
            .as_deref()
            .map(strip_provider)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ParseError::MissingField("ServiceName"))?;

        let start_utc = raw.start_utc.ok_or(ParseError::MissingField("StartUTC"))?;
        let timestamp_ms = DateTime::parse_from_rfc3339(&start_utc)
            .ok()
            .and_then(|t| u64::try_from(t.timestamp_millis()).ok())
            .ok_or(ParseError::InvalidTimestamp(start_utc))?;

        Ok(AccessEvent {
            service,
            timestamp_ms,
            status: status_code(raw.downstream_status),
            latency: raw
                .duration
                .filter(|d| *d >= 0.0)
                .map(|d| Duration::from_nanos(d as u64)),
        })
    }
}

/// `checkout@kubernetescrd` → `checkout`.
fn strip_provider(service: &str) -> &str {
    let service = service.trim();
    match service.rsplit_once('@') {
        Some((name, _provider)) => name,
        None => service,
    }
}
