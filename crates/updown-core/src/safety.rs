//! Process-wide safety accounting state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Auto-stop accounting, persisted at a fixed cadence and on every
/// transition. Single writer (the safety task); readers get copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoStopState {
    pub total_exposure: Decimal,
    pub realized_pnl_today: Decimal,
    pub unrealized_pnl: Decimal,
    pub drawdown_from_hwm: Decimal,
    pub tripped: bool,
    pub tripped_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for AutoStopState {
    fn default() -> Self {
        Self {
            total_exposure: Decimal::ZERO,
            realized_pnl_today: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            drawdown_from_hwm: Decimal::ZERO,
            tripped: false,
            tripped_reason: None,
            updated_at: Utc::now(),
        }
    }
}
