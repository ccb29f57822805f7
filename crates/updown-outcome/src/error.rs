//! Outcome logger error types.

use thiserror::Error;
use updown_core::ErrorCode;

#[derive(Debug, Error)]
pub enum OutcomeError {
    #[error("Store write failed: {0}")]
    Store(String),
}

impl OutcomeError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::DatabaseTransient
    }
}

pub type OutcomeResult<T> = Result<T, OutcomeError>;
