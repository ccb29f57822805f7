//! Symbol type for underlying crypto assets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Underlying asset symbol (e.g. "BTC", "ETH").
///
/// Stored uppercase. Used in window ids and as the per-symbol key in
/// the market state store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange trading pair, e.g. "BTCUSDT".
    pub fn exchange_pair(&self) -> String {
        format!("{}USDT", self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_uppercased() {
        assert_eq!(Symbol::new("btc").as_str(), "BTC");
        assert_eq!(Symbol::new("BTC").exchange_pair(), "BTCUSDT");
    }
}
