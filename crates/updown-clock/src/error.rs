//! Clock error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClockError {
    #[error("Contract discovery failed: {0}")]
    Discovery(String),

    #[error("Settlement lookup failed: {0}")]
    Settlement(String),

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Core error: {0}")]
    Core(#[from] updown_core::CoreError),
}

pub type ClockResult<T> = Result<T, ClockError>;
