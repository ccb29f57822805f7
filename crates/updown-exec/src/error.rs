//! Execution error types.

use thiserror::Error;
use updown_core::ErrorCode;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Order timed out after {0}ms")]
    Timeout(u64),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Credentials missing: {0}")]
    CredentialsMissing(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: String, available: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Venue error: {0}")]
    Venue(String),
}

impl ExecError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout(_) => ErrorCode::OrderTimeout,
            Self::CredentialsMissing(_) => ErrorCode::CredentialsMissing,
            _ => ErrorCode::OrderRejected,
        }
    }
}

pub type ExecResult<T> = Result<T, ExecError>;
