//! Feed error types.

use thiserror::Error;
use updown_core::ErrorCode;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed disconnected: {0}")]
    Disconnected(String),

    #[error("Feed stale: {source_name} age {age_ms}ms")]
    Stale { source_name: String, age_ms: i64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("WebSocket error: {0}")]
    Ws(#[from] updown_ws::WsError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl FeedError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Disconnected(_) | Self::Ws(_) | Self::Http(_) => ErrorCode::FeedDisconnected,
            Self::Stale { .. } => ErrorCode::FeedStale,
            Self::Parse(_) => ErrorCode::FeedDisconnected,
        }
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
