//! Store error types.

use thiserror::Error;
use updown_core::ErrorCode;
use updown_telemetry::redact;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Worth retrying: connection drops, pool timeouts.
    #[error("Transient database error: {0}")]
    Transient(String),

    /// Not worth retrying: bad SQL, constraint violations.
    #[error("Fatal database error: {0}")]
    Fatal(String),

    #[error("Circuit breaker open")]
    CircuitOpen,

    #[error("Invalid database config: {0}")]
    Config(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transient(_) | Self::CircuitOpen => ErrorCode::DatabaseTransient,
            Self::Config(_) => ErrorCode::ConfigInvalid,
            _ => ErrorCode::DatabaseFatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a sqlx error, scrubbing anything secret-shaped.
    pub fn from_sqlx(e: sqlx::Error) -> Self {
        let message = redact(&e.to_string());
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Transient(message),
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("57014") => {
                // statement_timeout cancellations are retryable.
                Self::Transient(message)
            }
            _ => Self::Fatal(message),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
