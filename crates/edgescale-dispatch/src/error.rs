//! Dispatcher error types.

use thiserror::Error;

/// Errors that can occur while starting or feeding the dispatcher.
///
/// A full lane is not an error: `submit` waits for capacity.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid dispatcher config: {0}")]
    InvalidConfig(String),

    #[error("lane {0} is closed")]
    LaneClosed(usize),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
