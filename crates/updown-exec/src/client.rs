//! The execution-client seam.

use crate::error::{ExecError, ExecResult};
use crate::order::{OrderRequest, PlacedOrder};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::info;
use updown_core::BookTop;

#[cfg(test)]
use mockall::automock;

/// Trading mode. LIVE requires explicit confirmation at config time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Paper,
    Live,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

/// Read-only top-of-book view the paper simulator fills against.
///
/// Implemented by the bot wiring over the market state store; keeps
/// the adapter decoupled from the feed layer.
pub trait PriceView: Send + Sync {
    fn book_top(&self, token_id: &str) -> Option<BookTop>;
}

/// Normalized execution interface.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn place_order(&self, order: OrderRequest) -> ExecResult<PlacedOrder>;

    async fn cancel(&self, order_id: &str) -> ExecResult<()>;

    /// Balance for one token, or the cash balance when `token_id` is
    /// None.
    async fn get_balance<'a>(&self, token_id: Option<&'a str>) -> ExecResult<Decimal>;

    fn mode(&self) -> TradingMode;
}

/// Validate credentials with a single balance round-trip.
///
/// Called once at init; a venue that cannot answer within the timeout
/// fails startup.
pub async fn validate_credentials(
    client: &dyn ExecutionClient,
    timeout: Duration,
) -> ExecResult<Decimal> {
    let balance = tokio::time::timeout(timeout, client.get_balance(None))
        .await
        .map_err(|_| ExecError::Timeout(timeout.as_millis() as u64))??;
    info!(mode = %client.mode(), %balance, "Execution credentials validated");
    Ok(balance)
}
