//! 15-minute contract windows aligned to the epoch grid.

use crate::{CoreError, Price, Result, Symbol};
use serde::{Deserialize, Serialize};

/// Window length in seconds. All open epochs are multiples of this.
pub const WINDOW_SECS: i64 = 900;

/// Floor a wall-clock second to its window's open epoch.
#[inline]
pub fn open_epoch_for(now_secs: i64) -> i64 {
    now_secs.div_euclid(WINDOW_SECS) * WINDOW_SECS
}

/// A single 15-minute binary up/down window.
///
/// Created when the clock first observes a wall-clock second mapping to
/// a not-yet-seen open epoch; immutable thereafter. Settles against the
/// oracle price at `close_epoch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Wire id: `<symbol>-updown-15m-<open_epoch>`.
    pub window_id: String,
    pub symbol: Symbol,
    /// Open time in whole seconds, multiple of 900.
    pub open_epoch: i64,
    pub close_epoch: i64,
    /// Reference price captured at window open.
    pub strike_price: Price,
    /// CLOB token for the "up" outcome.
    pub up_token_id: String,
    /// CLOB token for the "down" outcome.
    pub down_token_id: String,
}

impl Window {
    pub fn new(
        symbol: Symbol,
        open_epoch: i64,
        strike_price: Price,
        up_token_id: String,
        down_token_id: String,
    ) -> Result<Self> {
        if open_epoch % WINDOW_SECS != 0 {
            return Err(CoreError::InvalidWindowId(format!(
                "open epoch {open_epoch} is not aligned to {WINDOW_SECS}s"
            )));
        }
        Ok(Self {
            window_id: Self::id_for(&symbol, open_epoch),
            symbol,
            open_epoch,
            close_epoch: open_epoch + WINDOW_SECS,
            strike_price,
            up_token_id,
            down_token_id,
        })
    }

    /// Canonical window id for a symbol and open epoch.
    pub fn id_for(symbol: &Symbol, open_epoch: i64) -> String {
        format!("{symbol}-updown-15m-{open_epoch}")
    }

    /// Milliseconds until close, negative after close.
    pub fn time_remaining_ms(&self, now_ms: i64) -> i64 {
        self.close_epoch * 1000 - now_ms
    }

    /// Token id for a given outcome direction (true = up).
    pub fn token_for(&self, up: bool) -> &str {
        if up {
            &self.up_token_id
        } else {
            &self.down_token_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_open_epoch_alignment() {
        assert_eq!(open_epoch_for(1700000000), 1699999200);
        assert_eq!(open_epoch_for(1699999200), 1699999200);
        assert_eq!(open_epoch_for(1699999199), 1699998300);
    }

    #[test]
    fn test_window_id_format() {
        let w = Window::new(
            Symbol::new("BTC"),
            1699999200,
            Price::new(dec!(50000)),
            "up-tok".into(),
            "down-tok".into(),
        )
        .unwrap();
        assert_eq!(w.window_id, "BTC-updown-15m-1699999200");
        assert_eq!(w.close_epoch, 1700000100);
    }

    #[test]
    fn test_unaligned_epoch_rejected() {
        let res = Window::new(
            Symbol::new("BTC"),
            1699999201,
            Price::new(dec!(50000)),
            "u".into(),
            "d".into(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_time_remaining() {
        let w = Window::new(
            Symbol::new("ETH"),
            900,
            Price::new(dec!(3000)),
            "u".into(),
            "d".into(),
        )
        .unwrap();
        assert_eq!(w.time_remaining_ms(1_700_000), 100_000);
        assert!(w.time_remaining_ms(1_900_000) < 0);
    }
}
