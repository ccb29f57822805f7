//! Signals and their settled outcomes.

use crate::{OrderSide, Price, Size, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Signal direction: a fade bets against the market-implied outcome.
///
/// `FadeUp` means the market leans up and we bet down; `FadeDown` the
/// reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    FadeUp,
    FadeDown,
}

impl Direction {
    /// The settlement outcome that makes this signal correct.
    pub fn winning_outcome(&self) -> Outcome {
        match self {
            Self::FadeUp => Outcome::Down,
            Self::FadeDown => Outcome::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FadeUp => write!(f, "fade_up"),
            Self::FadeDown => write!(f, "fade_down"),
        }
    }
}

/// Window settlement outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Up,
    Down,
}

impl Outcome {
    /// Outcome of a window given the settlement oracle price and strike.
    /// Ties settle up.
    pub fn from_settlement(final_oracle_price: Price, strike: Price) -> Self {
        if final_oracle_price >= strike {
            Self::Up
        } else {
            Self::Down
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Market context captured at signal generation, used for attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInputs {
    pub time_remaining_ms: i64,
    /// Contract price we traded against.
    pub market_price: Option<Price>,
    /// Venue UI mid for the same token.
    pub ui_price: Option<Price>,
    pub oracle_price: Option<Price>,
    pub oracle_staleness_ms: i64,
    pub spread_pct: Option<Decimal>,
    pub strike: Option<Price>,
    /// 0.0 (all feeds fresh) to 1.0 (all feeds stale).
    pub staleness_score: f64,
}

/// An entry decision emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: Uuid,
    pub window_id: String,
    pub symbol: Symbol,
    pub direction: Direction,
    /// In [0, 1].
    pub confidence: f64,
    pub token_id: String,
    pub side: OrderSide,
    pub size: Size,
    pub inputs: SignalInputs,
    pub generated_at: DateTime<Utc>,
}

/// A signal joined with its window's settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub signal: Signal,
    pub final_oracle_price: Price,
    pub settlement_outcome: Outcome,
    pub signal_correct: bool,
    pub exit_price: Option<Price>,
    pub pnl: Decimal,
    pub settled_at: DateTime<Utc>,
}

/// Binary payoff P&L for a settled signal.
///
/// Winning contracts pay 1.0, losing contracts 0.0, so
/// `pnl = (correct ? 1 - entry : -entry) * size`.
pub fn binary_pnl(correct: bool, entry_price: Price, size: Size) -> Decimal {
    let per_contract = if correct {
        Decimal::ONE - entry_price.inner()
    } else {
        -entry_price.inner()
    };
    per_contract * size.inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_outcome_from_settlement() {
        let strike = Price::new(dec!(0.50));
        assert_eq!(
            Outcome::from_settlement(Price::new(dec!(0.48)), strike),
            Outcome::Down
        );
        assert_eq!(
            Outcome::from_settlement(Price::new(dec!(0.55)), strike),
            Outcome::Up
        );
        // Tie settles up.
        assert_eq!(
            Outcome::from_settlement(Price::new(dec!(0.50)), strike),
            Outcome::Up
        );
    }

    #[test]
    fn test_fade_winning_outcome() {
        assert_eq!(Direction::FadeUp.winning_outcome(), Outcome::Down);
        assert_eq!(Direction::FadeDown.winning_outcome(), Outcome::Up);
    }

    #[test]
    fn test_binary_pnl() {
        // Correct signal at 0.30 entry, size 1: pnl = 0.70
        assert_eq!(
            binary_pnl(true, Price::new(dec!(0.30)), Size::ONE),
            dec!(0.70)
        );
        // Incorrect: pnl = -0.30
        assert_eq!(
            binary_pnl(false, Price::new(dec!(0.30)), Size::ONE),
            dec!(-0.30)
        );
        // Scales with size.
        assert_eq!(
            binary_pnl(true, Price::new(dec!(0.40)), Size::new(dec!(10))),
            dec!(6.0)
        );
    }

    #[test]
    fn test_direction_serde() {
        assert_eq!(
            serde_json::to_string(&Direction::FadeUp).unwrap(),
            "\"fade_up\""
        );
        let d: Direction = serde_json::from_str("\"fade_down\"").unwrap();
        assert_eq!(d, Direction::FadeDown);
    }
}
