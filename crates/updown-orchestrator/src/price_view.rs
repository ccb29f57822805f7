//! Token-keyed price view over the market state store.
//!
//! The execution adapter quotes by token id; the market state store
//! is keyed by symbol. This view holds the token -> (symbol, is_up)
//! binding for every active window, maintained by the orchestrator as
//! windows open.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use updown_core::{BookTop, Symbol};
use updown_exec::PriceView;
use updown_feed::MarketStateHandle;

/// Shared token map + snapshot access.
pub struct MarketPriceView {
    market: MarketStateHandle,
    tokens: RwLock<HashMap<String, (Symbol, bool)>>,
}

impl MarketPriceView {
    pub fn new(market: MarketStateHandle) -> Arc<Self> {
        Arc::new(Self {
            market,
            tokens: RwLock::new(HashMap::new()),
        })
    }

    /// Bind a window's tokens. Previous bindings for the symbol are
    /// dropped.
    pub fn bind_window(&self, symbol: &Symbol, up_token: &str, down_token: &str) {
        let mut tokens = self.tokens.write();
        tokens.retain(|_, (sym, _)| sym != symbol);
        tokens.insert(up_token.to_string(), (symbol.clone(), true));
        tokens.insert(down_token.to_string(), (symbol.clone(), false));
    }
}

impl PriceView for MarketPriceView {
    fn book_top(&self, token_id: &str) -> Option<BookTop> {
        let (symbol, is_up) = self.tokens.read().get(token_id).cloned()?;
        let snapshot = self.market.snapshot(&symbol)?;
        if is_up {
            snapshot.up_book
        } else {
            snapshot.down_book
        }
    }
}
