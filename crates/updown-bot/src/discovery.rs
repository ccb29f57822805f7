//! Contract discovery and settlement lookup for the window clock.
//!
//! Paper mode derives the strike from the live price feeds at window
//! open and synthesizes deterministic token ids; a live deployment
//! substitutes a venue-catalog client behind the same traits.

use async_trait::async_trait;
use updown_clock::{ClockError, ClockResult, ContractMeta, ContractResolver, SettlementSource};
use updown_core::{Price, Symbol};
use updown_feed::MarketStateHandle;

/// How stale the oracle may be and still settle a window.
const SETTLEMENT_MAX_AGE_MS: i64 = 15_000;

/// Strike-at-spot resolver over the market state store.
pub struct SpotStrikeResolver {
    market: MarketStateHandle,
}

impl SpotStrikeResolver {
    pub fn new(market: MarketStateHandle) -> Self {
        Self { market }
    }
}

#[async_trait]
impl ContractResolver for SpotStrikeResolver {
    async fn resolve(&self, symbol: &Symbol, open_epoch: i64) -> ClockResult<ContractMeta> {
        let snapshot = self
            .market
            .snapshot(symbol)
            .ok_or_else(|| ClockError::Discovery(format!("no market data yet for {symbol}")))?;
        let strike = snapshot
            .spot()
            .or_else(|| snapshot.oracle().map(|q| q.price))
            .ok_or_else(|| ClockError::Discovery(format!("no reference price for {symbol}")))?;

        let base = format!("{}-updown-15m-{}", symbol.as_str().to_lowercase(), open_epoch);
        Ok(ContractMeta {
            strike_price: strike,
            up_token_id: format!("{base}-up"),
            down_token_id: format!("{base}-down"),
        })
    }
}

/// Settlement price from the freshest oracle feed.
pub struct OracleSettlementSource {
    market: MarketStateHandle,
}

impl OracleSettlementSource {
    pub fn new(market: MarketStateHandle) -> Self {
        Self { market }
    }
}

#[async_trait]
impl SettlementSource for OracleSettlementSource {
    async fn settlement_price(
        &self,
        symbol: &Symbol,
        _close_epoch: i64,
    ) -> ClockResult<Option<Price>> {
        let Some(snapshot) = self.market.snapshot(symbol) else {
            return Ok(None);
        };
        // A stale oracle is no settlement; the clock keeps polling
        // until its grace deadline.
        Ok(snapshot
            .oracle()
            .filter(|q| q.age_ms <= SETTLEMENT_MAX_AGE_MS)
            .map(|q| q.price))
    }
}
