//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal startup errors. Any of these aborts the daemon before the
/// listener opens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unsupported ingress type: {0:?} (expected \"nginx\" or \"traefik\")")]
    UnsupportedIngress(String),

    #[error("autoscale.services is empty: no target service defined")]
    NoTargetServices,

    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
