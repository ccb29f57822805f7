//! Position lifecycle records.

use crate::{OrderSide, Outcome, Price, Size};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position status. At most one position with status `Open` or
/// `Closing` may exist per `(strategy_id, window_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
}

impl PositionStatus {
    /// True for statuses that occupy the strategy/window slot.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Open | Self::Closing)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A held binary contract position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub strategy_id: Uuid,
    pub window_id: String,
    pub token_id: String,
    pub side: OrderSide,
    pub size: Size,
    pub entry_price: Price,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
    pub exit_price: Option<Price>,
    pub exit_reason: Option<String>,
}

impl Position {
    pub fn open(
        strategy_id: Uuid,
        window_id: String,
        token_id: String,
        side: OrderSide,
        size: Size,
        entry_price: Price,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy_id,
            window_id,
            token_id,
            side,
            size,
            entry_price,
            entry_time: Utc::now(),
            status: PositionStatus::Open,
            exit_price: None,
            exit_reason: None,
        }
    }

    /// Dollar cost of the position at entry.
    pub fn cost(&self) -> Decimal {
        self.size.notional(self.entry_price)
    }

    /// Settlement payout per contract: 1.0 when the held token matches
    /// the outcome, else 0.0. `held_up` says whether `token_id` is the
    /// window's up token.
    pub fn settlement_payout(&self, held_up: bool, outcome: Outcome) -> Price {
        let won = match outcome {
            Outcome::Up => held_up,
            Outcome::Down => !held_up,
        };
        if won {
            Price::ONE
        } else {
            Price::ZERO
        }
    }

    /// Realized P&L at settlement for a bought position.
    pub fn settlement_pnl(&self, held_up: bool, outcome: Outcome) -> Decimal {
        let payout = self.settlement_payout(held_up, outcome);
        (payout.inner() - self.entry_price.inner()) * self.size.inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Position {
        Position::open(
            Uuid::new_v4(),
            "BTC-updown-15m-900".into(),
            "down-tok".into(),
            OrderSide::Buy,
            Size::new(dec!(10)),
            Price::new(dec!(0.30)),
        )
    }

    #[test]
    fn test_live_statuses() {
        assert!(PositionStatus::Open.is_live());
        assert!(PositionStatus::Closing.is_live());
        assert!(!PositionStatus::Closed.is_live());
    }

    #[test]
    fn test_cost() {
        assert_eq!(sample().cost(), dec!(3.0));
    }

    #[test]
    fn test_settlement_pnl() {
        let pos = sample();
        // Held the down token, window settled down: payout 1.0.
        assert_eq!(pos.settlement_pnl(false, Outcome::Down), dec!(7.0));
        // Settled up: payout 0, lose the entry cost.
        assert_eq!(pos.settlement_pnl(false, Outcome::Up), dec!(-3.0));
    }
}
