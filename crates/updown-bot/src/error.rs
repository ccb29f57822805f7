//! Application error types.

use thiserror::Error;
use updown_core::ErrorCode;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Credentials missing: {0}")]
    Credentials(String),

    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("Manifest schema invalid: {0}")]
    ManifestInvalidSchema(String),

    #[error("Manifest names unknown strategy: {0}")]
    ManifestUnknownStrategy(String),

    #[error("Manifest write failed: {0}")]
    ManifestWriteFailed(String),

    #[error("Startup failed: {0}")]
    Startup(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigInvalid,
            Self::Credentials(_) => ErrorCode::CredentialsMissing,
            Self::ManifestNotFound(_) => ErrorCode::ManifestNotFound,
            Self::ManifestInvalidSchema(_) => ErrorCode::ManifestInvalidSchema,
            Self::ManifestUnknownStrategy(_) => ErrorCode::ManifestUnknownStrategy,
            Self::ManifestWriteFailed(_) => ErrorCode::ManifestWriteFailed,
            Self::Startup(_) => ErrorCode::NotInitialized,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
