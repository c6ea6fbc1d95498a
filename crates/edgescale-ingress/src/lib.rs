//! edgescale-ingress — access-log decoding for edge proxies.
//!
//! Turns one raw datagram into the access events it carries, keeping only
//! events for configured target services.
//!
//! # Formats
//!
//! ```text
//! nginx    <190>Oct 19 12:00:00 edge-1 nginx: {"service":"checkout","msec":"1697716800.123",...}
//! traefik  {"ServiceName":"checkout@kubernetes","StartUTC":"2023-10-19T12:00:00.123Z",...}
//! ```
//!
//! A datagram may hold several newline-separated lines. Malformed lines are
//! counted and skipped; they never fail the datagram.

pub mod error;
pub mod nginx;
pub mod traefik;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, trace};

use edgescale_core::{AccessEvent, IngressKind, TargetServices};

pub use error::ParseError;
pub use nginx::NginxParser;
pub use traefik::TraefikParser;

/// Parser variant, selected once from configuration.
#[derive(Debug, Clone)]
pub enum IngressParser {
    Nginx(NginxParser),
    Traefik(TraefikParser),
}

impl IngressParser {
    pub fn new(kind: IngressKind) -> Self {
        match kind {
            IngressKind::Nginx => IngressParser::Nginx(NginxParser::new()),
            IngressKind::Traefik => IngressParser::Traefik(TraefikParser::new()),
        }
    }

    pub fn kind(&self) -> IngressKind {
        match self {
            IngressParser::Nginx(_) => IngressKind::Nginx,
            IngressParser::Traefik(_) => IngressKind::Traefik,
        }
    }

    /// Decode one line into an event, without filtering.
    pub fn parse_line(&self, line: &str) -> Result<AccessEvent, ParseError> {
        match self {
            IngressParser::Nginx(p) => p.parse_line(line),
            IngressParser::Traefik(p) => p.parse_line(line),
        }
    }

    /// Decode a datagram and drop every event whose service is not a target.
    pub fn parse(&self, datagram: &[u8], targets: &TargetServices) -> ParsedDatagram {
        let text = String::from_utf8_lossy(datagram);
        let mut out = ParsedDatagram::default();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match self.parse_line(line) {
                Ok(event) if targets.contains(&event.service) => out.events.push(event),
                Ok(event) => {
                    out.filtered += 1;
                    trace!(service = %event.service, "dropped event for non-target service");
                }
                Err(e) => {
                    out.malformed += 1;
                    debug!(ingress = %self.kind(), error = %e, "skipping malformed access-log line");
                }
            }
        }

        out
    }
}

/// Result of parsing one datagram.
///
/// Consumed once by iterating it.
#[derive(Debug, Default)]
pub struct ParsedDatagram {
    events: Vec<AccessEvent>,
    /// Lines that could not be decoded.
    pub malformed: usize,
    /// Well-formed lines for services outside the target set.
    pub filtered: usize,
}

impl ParsedDatagram {
    /// Number of target-service events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl IntoIterator for ParsedDatagram {
    type Item = AccessEvent;
    type IntoIter = std::vec::IntoIter<AccessEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// Accept a JSON number or a numeric string. `"-"`, empty strings and
/// other values read as absent.
pub(crate) fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

/// Status codes outside the HTTP range read as absent.
pub(crate) fn status_code(raw: Option<f64>) -> Option<u16> {
    raw.filter(|s| (100.0..1000.0).contains(s)).map(|s| s as u16)
}
