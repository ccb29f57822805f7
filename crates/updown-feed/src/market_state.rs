//! Per-symbol market state aggregation.
//!
//! Single-writer store: one ingest task applies ticks in arrival
//! order; readers obtain point-in-time `MarketSnapshot` copies that
//! concurrent updates never tear.

use crate::tick_queue::TickQueue;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, trace, warn};
use updown_core::{
    BookTop, BookUpdate, MarketSnapshot, Price, Size, SourceQuote, Symbol, Tick, TickPayload,
    TickSource,
};
use updown_telemetry::metrics;

/// Order-book levels for one CLOB token.
#[derive(Debug, Default)]
struct BookState {
    bids: BTreeMap<Decimal, Size>,
    asks: BTreeMap<Decimal, Size>,
    last_seq: u64,
}

impl BookState {
    /// Apply a snapshot or delta. Out-of-order updates are dropped.
    fn apply(&mut self, update: &BookUpdate) -> bool {
        if update.seq <= self.last_seq && self.last_seq != 0 {
            warn!(
                token_id = %update.token_id,
                seq = update.seq,
                last_seq = self.last_seq,
                "Out-of-order book update dropped"
            );
            return false;
        }
        if update.is_snapshot {
            self.bids.clear();
            self.asks.clear();
        }
        for level in &update.bids {
            if level.size.is_zero() {
                self.bids.remove(&level.price.inner());
            } else {
                self.bids.insert(level.price.inner(), level.size);
            }
        }
        for level in &update.asks {
            if level.size.is_zero() {
                self.asks.remove(&level.price.inner());
            } else {
                self.asks.insert(level.price.inner(), level.size);
            }
        }
        self.last_seq = update.seq;
        true
    }

    fn top(&self) -> Option<BookTop> {
        let (bid_px, bid_sz) = self.bids.iter().next_back()?;
        let (ask_px, ask_sz) = self.asks.iter().next()?;
        Some(BookTop {
            best_bid: Price::new(*bid_px),
            bid_size: *bid_sz,
            best_ask: Price::new(*ask_px),
            ask_size: *ask_sz,
        })
    }
}

/// Mutable state for one symbol.
#[derive(Debug, Default)]
struct SymbolState {
    /// Last price and monotonic receipt time per source.
    quotes: HashMap<TickSource, (Price, Instant)>,
    /// Book state per CLOB token.
    books: HashMap<String, BookState>,
    /// Current window's (up, down) token ids, set by the window clock.
    window_tokens: Option<(String, String)>,
    /// Current window's strike.
    strike: Option<Price>,
}

type StateEntry = Arc<RwLock<SymbolState>>;

/// Aggregated market state across symbols.
pub struct MarketStateStore {
    markets: DashMap<Symbol, StateEntry>,
}

/// Shared handle to the store.
pub type MarketStateHandle = Arc<MarketStateStore>;

impl MarketStateStore {
    pub fn new() -> MarketStateHandle {
        Arc::new(Self {
            markets: DashMap::new(),
        })
    }

    fn entry(&self, symbol: &Symbol) -> StateEntry {
        self.markets
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(RwLock::new(SymbolState::default())))
            .clone()
    }

    /// Apply one tick. Called only from the ingest task.
    pub fn apply(&self, tick: &Tick) {
        metrics::TICKS_TOTAL
            .with_label_values(&[tick.source.as_str(), tick.symbol.as_str()])
            .inc();

        let entry = self.entry(&tick.symbol);
        let mut state = entry.write();
        match &tick.payload {
            TickPayload::Price(price) => {
                state.quotes.insert(tick.source, (*price, Instant::now()));
                trace!(source = %tick.source, symbol = %tick.symbol, price = %price, "Price tick");
            }
            TickPayload::Book(update) => {
                let token = update.token_id.clone();
                let applied = state.books.entry(token.clone()).or_default().apply(update);
                if applied {
                    // Book arrival doubles as the clob_book price signal:
                    // record the token mid as the source quote.
                    if let Some(mid) = state.books.get(&token).and_then(BookState::top).and_then(|t| t.mid())
                    {
                        state.quotes.insert(TickSource::ClobBook, (mid, Instant::now()));
                    }
                }
            }
        }
    }

    /// Bind the current window's tokens and strike for a symbol.
    ///
    /// Book state for tokens of previous windows is discarded.
    pub fn set_window(&self, symbol: &Symbol, up_token: String, down_token: String, strike: Price) {
        let entry = self.entry(symbol);
        let mut state = entry.write();
        state
            .books
            .retain(|token, _| *token == up_token || *token == down_token);
        state.window_tokens = Some((up_token, down_token));
        state.strike = Some(strike);
        debug!(symbol = %symbol, strike = %strike, "Window bound to market state");
    }

    /// Point-in-time snapshot for a symbol. None until first tick.
    pub fn snapshot(&self, symbol: &Symbol) -> Option<MarketSnapshot> {
        let entry = self.markets.get(symbol)?.clone();
        let state = entry.read();

        let sources = state
            .quotes
            .iter()
            .map(|(source, (price, at))| {
                (
                    *source,
                    SourceQuote {
                        price: *price,
                        age_ms: at.elapsed().as_millis() as i64,
                    },
                )
            })
            .collect();

        let (up_book, down_book) = match &state.window_tokens {
            Some((up, down)) => (
                state.books.get(up).and_then(BookState::top),
                state.books.get(down).and_then(BookState::top),
            ),
            None => (None, None),
        };

        Some(MarketSnapshot {
            symbol: symbol.clone(),
            taken_at: Utc::now(),
            sources,
            up_book,
            down_book,
            strike: state.strike,
        })
    }

    /// Last price per source for every symbol, for the last-known-state
    /// file.
    pub fn latest_prices(&self) -> HashMap<String, HashMap<String, Price>> {
        let mut out = HashMap::new();
        for entry in self.markets.iter() {
            let state = entry.value().read();
            let per_source: HashMap<String, Price> = state
                .quotes
                .iter()
                .map(|(source, (price, _))| (source.as_str().to_string(), *price))
                .collect();
            out.insert(entry.key().as_str().to_string(), per_source);
        }
        out
    }
}

/// Consume the tick queue into the store until shutdown.
pub async fn run_ingest(
    store: MarketStateHandle,
    queue: TickQueue,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            tick = queue.pop() => store.apply(&tick),
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    // Drain what is already queued, then stop.
                    while let Some(tick) = queue.try_pop() {
                        store.apply(&tick);
                    }
                    debug!("Tick ingest stopped");
                    return;
                }
            }
        }
    }
}
