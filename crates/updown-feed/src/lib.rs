//! Price-feed subscribers and the per-symbol market state store.
//!
//! One long-lived task per upstream source (exchange WebSocket, oracle
//! push WebSocket, oracle SSE, CLOB order book). Each subscriber
//! normalizes upstream messages into `Tick`s and publishes them to the
//! market state store through a bounded drop-oldest queue. Downstream
//! consumers only ever see `Tick`s and `MarketSnapshot`s.

pub mod clob;
pub mod error;
pub mod exchange;
pub mod market_state;
pub mod oracle;
pub mod tick_queue;

pub use error::{FeedError, FeedResult};
pub use market_state::{MarketStateHandle, MarketStateStore};
pub use tick_queue::TickQueue;

use once_cell::sync::Lazy;
use std::time::Instant;

static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic nanoseconds since process start, for tick receipt times.
pub fn mono_ns() -> u64 {
    PROCESS_START.elapsed().as_nanos() as u64
}
