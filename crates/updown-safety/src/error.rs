//! Safety error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("Pidfile error: {0}")]
    Pidfile(String),

    #[error("Signal delivery failed: {0}")]
    Signal(String),

    #[error("State file error: {0}")]
    StateFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SafetyResult<T> = Result<T, SafetyError>;
