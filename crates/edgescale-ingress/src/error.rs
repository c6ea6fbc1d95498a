//! Per-line parse errors.

use thiserror::Error;

/// Why a single access-log line was skipped. Never fatal: the rest of
/// the datagram is still processed.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line does not carry the {0:?} syslog tag")]
    MissingTag(&'static str),

    #[error("no JSON object in line")]
    NoPayload,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
