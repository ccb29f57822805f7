//! Contract discovery and settlement price sources.

use crate::error::ClockResult;
use async_trait::async_trait;
use updown_core::{Price, Symbol};

/// Contract metadata for one window, resolved at discovery time.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractMeta {
    pub strike_price: Price,
    pub up_token_id: String,
    pub down_token_id: String,
}

/// Resolves the binary contract backing a window.
///
/// Implemented against the venue's market catalog in live mode and by
/// fixtures in tests and backtests.
#[async_trait]
pub trait ContractResolver: Send + Sync {
    async fn resolve(&self, symbol: &Symbol, open_epoch: i64) -> ClockResult<ContractMeta>;
}

/// Provides the settlement oracle price for a closed window.
///
/// Returns Ok(None) while the price is not yet published; the clock
/// keeps polling until the grace deadline.
#[async_trait]
pub trait SettlementSource: Send + Sync {
    async fn settlement_price(
        &self,
        symbol: &Symbol,
        close_epoch: i64,
    ) -> ClockResult<Option<Price>>;
}
