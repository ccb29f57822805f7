//! Error types for updown-core and the shared error-code taxonomy.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid window id: {0}")]
    InvalidWindowId(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The closed error-code taxonomy shared by every subsystem.
///
/// Every structured error in the system carries exactly one of these
/// codes; new failure modes must be mapped onto an existing code or the
/// taxonomy must be extended deliberately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    AlreadyInitialized,
    NotInitialized,
    ConfigInvalid,
    CredentialsMissing,
    ManifestNotFound,
    ManifestInvalidSchema,
    ManifestUnknownStrategy,
    ManifestWriteFailed,
    ComponentNotFound,
    ComponentInterfaceInvalid,
    ComponentTypeMismatch,
    ComponentVersionExists,
    StrategyNotFound,
    StrategyInactive,
    StrategyValidationFailed,
    ConfigValidationFailed,
    ForkParentNotFound,
    ForkParentInactive,
    ComponentExecutionFailed,
    ComponentOutputInvalid,
    UpgradeValidationFailed,
    DatabaseTransient,
    DatabaseFatal,
    FeedDisconnected,
    FeedStale,
    OrderRejected,
    OrderTimeout,
    SafetyTripped,
}

impl ErrorCode {
    /// Stable string form used in logs and persisted error records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyInitialized => "AlreadyInitialized",
            Self::NotInitialized => "NotInitialized",
            Self::ConfigInvalid => "ConfigInvalid",
            Self::CredentialsMissing => "CredentialsMissing",
            Self::ManifestNotFound => "ManifestNotFound",
            Self::ManifestInvalidSchema => "ManifestInvalidSchema",
            Self::ManifestUnknownStrategy => "ManifestUnknownStrategy",
            Self::ManifestWriteFailed => "ManifestWriteFailed",
            Self::ComponentNotFound => "ComponentNotFound",
            Self::ComponentInterfaceInvalid => "ComponentInterfaceInvalid",
            Self::ComponentTypeMismatch => "ComponentTypeMismatch",
            Self::ComponentVersionExists => "ComponentVersionExists",
            Self::StrategyNotFound => "StrategyNotFound",
            Self::StrategyInactive => "StrategyInactive",
            Self::StrategyValidationFailed => "StrategyValidationFailed",
            Self::ConfigValidationFailed => "ConfigValidationFailed",
            Self::ForkParentNotFound => "ForkParentNotFound",
            Self::ForkParentInactive => "ForkParentInactive",
            Self::ComponentExecutionFailed => "ComponentExecutionFailed",
            Self::ComponentOutputInvalid => "ComponentOutputInvalid",
            Self::UpgradeValidationFailed => "UpgradeValidationFailed",
            Self::DatabaseTransient => "DatabaseTransient",
            Self::DatabaseFatal => "DatabaseFatal",
            Self::FeedDisconnected => "FeedDisconnected",
            Self::FeedStale => "FeedStale",
            Self::OrderRejected => "OrderRejected",
            Self::OrderTimeout => "OrderTimeout",
            Self::SafetyTripped => "SafetyTripped",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
