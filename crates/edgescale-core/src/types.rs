//! Shared types used across edgescale crates.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One request observed in an edge-proxy access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessEvent {
    /// Service (upstream) the request was routed to.
    pub service: String,
    /// Request time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// HTTP status returned downstream, if the format carries it.
    pub status: Option<u16>,
    /// Upstream latency, if the format carries it.
    pub latency: Option<Duration>,
}

impl AccessEvent {
    pub fn new(service: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            service: service.into(),
            timestamp_ms,
            status: None,
            latency: None,
        }
    }

    /// Whether the request counts as a server-side error (5xx).
    pub fn is_error(&self) -> bool {
        matches!(self.status, Some(s) if s >= 500)
    }
}

/// The set of services configured for autoscaling.
///
/// Never empty: construction fails with [`ConfigError::NoTargetServices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetServices(BTreeSet<String>);

impl TargetServices {
    pub fn new<I, S>(services: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = services
            .into_iter()
            .map(Into::into)
            .map(|s: String| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if set.is_empty() {
            return Err(ConfigError::NoTargetServices);
        }
        Ok(Self(set))
    }

    pub fn contains(&self, service: &str) -> bool {
        self.0.contains(service)
    }

    /// Services in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Edge proxy whose access-log format the parser decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngressKind {
    Nginx,
    Traefik,
}

impl IngressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngressKind::Nginx => "nginx",
            IngressKind::Traefik => "traefik",
        }
    }
}

impl FromStr for IngressKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nginx" => Ok(IngressKind::Nginx),
            "traefik" => Ok(IngressKind::Traefik),
            _ => Err(ConfigError::UnsupportedIngress(s.to_string())),
        }
    }
}

impl fmt::Display for IngressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the most recent scale action for a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleDirection {
    #[default]
    None,
    Up,
    Down,
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScaleDirection::None => "none",
            ScaleDirection::Up => "up",
            ScaleDirection::Down => "down",
        };
        f.write_str(s)
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
