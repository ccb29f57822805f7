//! Normalized tick types emitted by the price-feed subscribers.

use crate::{Price, Size, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which upstream produced a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickSource {
    Exchange,
    OraclePush,
    OracleSse,
    ClobBook,
}

impl TickSource {
    pub const ALL: [TickSource; 4] = [
        Self::Exchange,
        Self::OraclePush,
        Self::OracleSse,
        Self::ClobBook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::OraclePush => "oracle_push",
            Self::OracleSse => "oracle_sse",
            Self::ClobBook => "clob_book",
        }
    }
}

impl fmt::Display for TickSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub size: Size,
}

/// Order-book update for one CLOB token.
///
/// `seq` is the venue's monotonically increasing sequence number; the
/// market state store drops updates whose `seq` does not advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub token_id: String,
    pub seq: u64,
    /// True for a full snapshot, false for an incremental delta.
    pub is_snapshot: bool,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Tick payload: either a plain price or an order-book update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPayload {
    Price(Price),
    Book(BookUpdate),
}

/// A normalized tick from one source.
///
/// `recv_mono_ns` is a monotonic receipt timestamp taken by the
/// subscriber; it is comparable only to other ticks from this process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub source: TickSource,
    pub symbol: Symbol,
    pub recv_mono_ns: u64,
    pub payload: TickPayload,
}

impl Tick {
    pub fn price(source: TickSource, symbol: Symbol, recv_mono_ns: u64, price: Price) -> Self {
        Self {
            source,
            symbol,
            recv_mono_ns,
            payload: TickPayload::Price(price),
        }
    }

    pub fn book(symbol: Symbol, recv_mono_ns: u64, update: BookUpdate) -> Self {
        Self {
            source: TickSource::ClobBook,
            symbol,
            recv_mono_ns,
            payload: TickPayload::Book(update),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_source_round_trip() {
        for src in TickSource::ALL {
            let json = serde_json::to_string(&src).unwrap();
            let back: TickSource = serde_json::from_str(&json).unwrap();
            assert_eq!(src, back);
        }
        assert_eq!(
            serde_json::to_string(&TickSource::OracleSse).unwrap(),
            "\"oracle_sse\""
        );
    }

    #[test]
    fn test_price_tick() {
        let t = Tick::price(
            TickSource::Exchange,
            Symbol::new("BTC"),
            42,
            Price::new(dec!(50000)),
        );
        assert_eq!(t.source, TickSource::Exchange);
        assert!(matches!(t.payload, TickPayload::Price(_)));
    }
}
