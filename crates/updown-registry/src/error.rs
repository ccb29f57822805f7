//! Structured registry errors.
//!
//! Every composer failure carries a code from the closed taxonomy, a
//! human-readable message, and a JSON context. The composer never
//! catches and swallows; callers decide.

use serde_json::Value;
use thiserror::Error;
use updown_core::ErrorCode;

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct RegistryError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Value,
}

impl RegistryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Value::Null,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
