//! nginx access logs forwarded over syslog.
//!
//! nginx writes one syslog message per request (`access_log syslog:server=...`).
//! The message body follows the `nginx: ` tag and is a JSON object produced by
//! a `log_format ... escape=json` directive, e.g.
//!
//! ```text
//! log_format edgescale escape=json
//!   '{"service":"$proxy_host","msec":"$msec","status":"$status","request_time":"$request_time"}';
//! ```

use std::time::Duration;

use serde::Deserialize;

use edgescale_core::AccessEvent;

use crate::error::ParseError;
use crate::{number_or_string, status_code};

/// Syslog tag nginx prefixes its messages with.
pub const NGINX_TAG: &str = "nginx: ";

#[derive(Debug, Deserialize)]
struct NginxLine {
    #[serde(default, alias = "upstream_name", alias = "proxy_upstream_name")]
    service: Option<String>,
    /// Epoch seconds with millisecond fraction.
    #[serde(default, deserialize_with = "number_or_string")]
    msec: Option<f64>,
    #[serde(default, deserialize_with = "number_or_string")]
    status: Option<f64>,
    /// Seconds.
    #[serde(default, deserialize_with = "number_or_string")]
    request_time: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct NginxParser;

impl NginxParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_line(&self, line: &str) -> Result<AccessEvent, ParseError> {
        let idx = line.find(NGINX_TAG).ok_or(ParseError::MissingTag(NGINX_TAG))?;
        let payload = line[idx + NGINX_TAG.len()..].trim();
        if payload.is_empty() {
            return Err(ParseError::NoPayload);
        }

        let raw: NginxLine = serde_json::from_str(payload)?;

        let service = raw
            .service
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "-")
            .ok_or(ParseError::MissingField("service"))?;

        let msec = raw.msec.ok_or(ParseError::MissingField("msec"))?;
        if msec < 0.0 {
            return Err(ParseError::InvalidTimestamp(msec.to_string()));
        }

        Ok(AccessEvent {
            service,
            timestamp_ms: (msec * 1000.0).round() as u64,
            status: status_code(raw.status),
            latency: raw
                .request_time
                .filter(|t| *t >= 0.0)
                .map(Duration::from_secs_f64),
        })
    }
}
