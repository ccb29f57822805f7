//! Point-in-time market snapshots.
//!
//! A `MarketSnapshot` is a consistent copy of the per-symbol market
//! state: last price and age per source, top-of-book for the current
//! window's up/down tokens, strike, and spot. Snapshots are plain
//! values; once returned they never change under the caller.

use crate::{Price, Size, TickSource};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Last known price from one source plus its age.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceQuote {
    pub price: Price,
    pub age_ms: i64,
}

/// Top of book for one CLOB token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTop {
    pub best_bid: Price,
    pub bid_size: Size,
    pub best_ask: Price,
    pub ask_size: Size,
}

impl BookTop {
    /// Mid price, None if either side is missing.
    pub fn mid(&self) -> Option<Price> {
        if !self.best_bid.is_positive() || !self.best_ask.is_positive() {
            return None;
        }
        Some(Price::mid(self.best_bid, self.best_ask))
    }

    /// Spread as a percentage of mid.
    pub fn spread_pct(&self) -> Option<Decimal> {
        let mid = self.mid()?;
        if mid.is_zero() {
            return None;
        }
        Some((self.best_ask.inner() - self.best_bid.inner()) / mid.inner() * Decimal::from(100))
    }
}

/// Consistent point-in-time view of one symbol's market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: crate::Symbol,
    pub taken_at: DateTime<Utc>,
    /// Last price and age per source.
    pub sources: HashMap<TickSource, SourceQuote>,
    /// Top of book for the current window's up token.
    pub up_book: Option<BookTop>,
    /// Top of book for the current window's down token.
    pub down_book: Option<BookTop>,
    /// Strike of the current window, once discovered.
    pub strike: Option<Price>,
}

impl MarketSnapshot {
    /// Spot from the exchange feed.
    pub fn spot(&self) -> Option<Price> {
        self.sources.get(&TickSource::Exchange).map(|q| q.price)
    }

    /// Freshest oracle price across push and SSE feeds.
    pub fn oracle(&self) -> Option<SourceQuote> {
        let push = self.sources.get(&TickSource::OraclePush);
        let sse = self.sources.get(&TickSource::OracleSse);
        match (push, sse) {
            (Some(a), Some(b)) => Some(if a.age_ms <= b.age_ms { *a } else { *b }),
            (Some(a), None) => Some(*a),
            (None, Some(b)) => Some(*b),
            (None, None) => None,
        }
    }

    /// Age of the freshest oracle source, i64::MAX when absent.
    pub fn oracle_staleness_ms(&self) -> i64 {
        self.oracle().map(|q| q.age_ms).unwrap_or(i64::MAX)
    }

    /// Market-implied probability of the up outcome (mid of the up book).
    pub fn implied_up(&self) -> Option<Price> {
        self.up_book.and_then(|b| b.mid())
    }

    /// True when every listed source is older than `max_age_ms`.
    pub fn all_stale(&self, max_age_ms: i64) -> bool {
        self.sources.values().all(|q| q.age_ms > max_age_ms)
    }
}
