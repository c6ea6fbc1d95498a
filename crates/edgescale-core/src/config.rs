//! edgescale.toml configuration parser.
//!
//! [`EdgescaleConfig`] mirrors the file as written. [`EdgescaleConfig::resolve`]
//! validates it into [`Settings`], the typed form the daemon runs on. Every
//! validation failure is a fatal [`ConfigError`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{IngressKind, TargetServices};

pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;
pub const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgescaleConfig {
    pub ingress_type: String,
    pub listen: ListenConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub autoscale: AutoscaleConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenConfig {
    pub address: String,
    pub port: u16,
}

impl ListenConfig {
    /// `host:port` string suitable for binding.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoscaleConfig {
    #[serde(default)]
    pub services: Vec<String>,
    pub max_qps: f64,
    pub safe_qps: f64,
    /// Number of tumbling windows per minute.
    pub samples_per_minute: u32,
    pub min_replicas: u32,
    pub max_replicas: Option<u32>,
    pub scale_step: u32,
    pub cooldown: String,
    pub evaluate_interval: Option<String>,
}

/// Validated, typed configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ingress: IngressKind,
    pub listen: ListenConfig,
    pub dispatch: DispatchConfig,
    pub autoscale: AutoscaleSettings,
}

#[derive(Debug, Clone)]
pub struct AutoscaleSettings {
    pub targets: TargetServices,
    pub max_qps: f64,
    pub safe_qps: f64,
    /// Tumbling window length.
    pub window: Duration,
    pub min_replicas: u32,
    pub max_replicas: Option<u32>,
    pub scale_step: u32,
    pub cooldown: Duration,
    pub evaluate_interval: Duration,
}

impl EdgescaleConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate into [`Settings`].
    pub fn resolve(&self) -> ConfigResult<Settings> {
        let ingress: IngressKind = self.ingress_type.parse()?;
        let targets = TargetServices::new(self.autoscale.services.iter().cloned())?;

        if self.dispatch.pool_size == 0 {
            return Err(invalid("dispatch.pool_size", "must be at least 1"));
        }
        if self.dispatch.queue_depth == 0 {
            return Err(invalid("dispatch.queue_depth", "must be at least 1"));
        }

        let a = &self.autoscale;
        if !(a.max_qps.is_finite() && a.max_qps >= 0.0) {
            return Err(invalid("autoscale.max_qps", "must be a non-negative number"));
        }
        if !(a.safe_qps.is_finite() && a.safe_qps >= 0.0) {
            return Err(invalid("autoscale.safe_qps", "must be a non-negative number"));
        }
        if a.safe_qps > a.max_qps {
            return Err(invalid(
                "autoscale.safe_qps",
                format!("{} exceeds max_qps {}", a.safe_qps, a.max_qps),
            ));
        }
        if a.samples_per_minute == 0 || a.samples_per_minute > 60_000 {
            return Err(invalid(
                "autoscale.samples_per_minute",
                "must be between 1 and 60000",
            ));
        }
        if a.scale_step == 0 {
            return Err(invalid("autoscale.scale_step", "must be at least 1"));
        }
        if let Some(max) = a.max_replicas {
            if max < a.min_replicas {
                return Err(invalid(
                    "autoscale.max_replicas",
                    format!("{max} is below min_replicas {}", a.min_replicas),
                ));
            }
        }

        let window = Duration::from_secs(60) / a.samples_per_minute;
        let cooldown = parse_duration("autoscale.cooldown", &a.cooldown)?;
        let evaluate_interval = match &a.evaluate_interval {
            Some(s) => parse_duration("autoscale.evaluate_interval", s)?,
            None => window,
        };
        if cooldown > MAX_COOLDOWN {
            return Err(invalid("autoscale.cooldown", "must not exceed 24h"));
        }
        if evaluate_interval.is_zero() {
            return Err(invalid("autoscale.evaluate_interval", "must be non-zero"));
        }

        Ok(Settings {
            ingress,
            listen: self.listen.clone(),
            dispatch: self.dispatch,
            autoscale: AutoscaleSettings {
                targets,
                max_qps: a.max_qps,
                safe_qps: a.safe_qps,
                window,
                min_replicas: a.min_replicas,
                max_replicas: a.max_replicas,
                scale_step: a.scale_step,
                cooldown,
                evaluate_interval,
            },
        })
    }
}

impl Settings {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        EdgescaleConfig::from_file(path)?.resolve()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Parse a duration string like "250ms", "30s", "5m", "1h".
///
/// A bare number is read as seconds.
pub fn parse_duration(field: &'static str, s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let err = || ConfigError::InvalidDuration {
        field,
        value: s.to_string(),
    };

    let (digits, unit_ms) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1_000)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60_000)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3_600_000)
    } else {
        (s, 1_000)
    };

    let value: u64 = digits.trim().parse().map_err(|_| err())?;
    value
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(err)
}
