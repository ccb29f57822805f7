//! The replay driver.

use crate::{BacktestError, BacktestResult};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use updown_core::{binary_pnl, Direction, MarketSnapshot, Outcome, Price, Size, Window};
use updown_registry::{DecisionAction, EvalContext, Registry};
use uuid::Uuid;

/// One recorded window: market frames in time order plus the
/// settlement price.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    pub window: Window,
    /// `(now_ms, snapshot)` frames, ascending by time.
    pub frames: Vec<(i64, MarketSnapshot)>,
    pub final_oracle_price: Price,
}

/// Per-strategy backtest summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategySummary {
    pub evaluations: usize,
    pub entries: usize,
    pub wins: usize,
    pub losses: usize,
    pub total_pnl: Decimal,
}

/// Full backtest report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub windows: usize,
    pub per_strategy: BTreeMap<Uuid, StrategySummary>,
}

/// Replays windows through the registry.
pub struct ReplayDriver {
    registry: Arc<Registry>,
}

impl ReplayDriver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Run the replay. One entry per strategy per window, filled at
    /// the entered token's ask, settled at the binary payout.
    pub fn run(
        &self,
        strategy_ids: &[Uuid],
        windows: &[ReplayWindow],
    ) -> BacktestResult<ReplayReport> {
        if strategy_ids.is_empty() {
            return Err(BacktestError::InvalidInput("no strategies given".into()));
        }

        let mut report = ReplayReport {
            windows: windows.len(),
            ..Default::default()
        };
        for id in strategy_ids {
            report.per_strategy.insert(*id, StrategySummary::default());
        }

        for replay in windows {
            let outcome =
                Outcome::from_settlement(replay.final_oracle_price, replay.window.strike_price);

            for strategy_id in strategy_ids {
                let summary = report
                    .per_strategy
                    .get_mut(strategy_id)
                    .expect("summary preallocated");
                let mut entered: Option<(Direction, Price, Size)> = None;

                for (now_ms, snapshot) in &replay.frames {
                    if entered.is_some() {
                        break; // one position per strategy per window
                    }
                    let ctx = EvalContext {
                        window: replay.window.clone(),
                        snapshot: snapshot.clone(),
                        time_remaining_ms: replay.window.time_remaining_ms(*now_ms),
                        now_ms: *now_ms,
                        position: None,
                    };
                    summary.evaluations += 1;

                    let decision = self.registry.execute_strategy(*strategy_id, &ctx)?;
                    if decision.action != DecisionAction::Enter {
                        continue;
                    }
                    let direction = match decision.direction.as_deref() {
                        Some("fade_up") => Direction::FadeUp,
                        Some("fade_down") => Direction::FadeDown,
                        _ => continue,
                    };
                    // A fade buys the token of the outcome it bets on.
                    let book = if direction == Direction::FadeDown {
                        snapshot.up_book
                    } else {
                        snapshot.down_book
                    };
                    let Some(book) = book else { continue };
                    if !book.best_ask.is_positive() {
                        continue;
                    }
                    let contracts =
                        Size::new((decision.size / book.best_ask.inner()).round_dp(2));
                    if !contracts.is_positive() {
                        continue;
                    }
                    entered = Some((direction, book.best_ask, contracts));
                }

                if let Some((direction, entry_price, size)) = entered {
                    summary.entries += 1;
                    let correct = direction.winning_outcome() == outcome;
                    if correct {
                        summary.wins += 1;
                    } else {
                        summary.losses += 1;
                    }
                    summary.total_pnl += binary_pnl(correct, entry_price, size);
                    debug!(
                        window_id = %replay.window.window_id,
                        %strategy_id,
                        %direction,
                        correct,
                        "Replay entry settled"
                    );
                }
            }
        }

        Ok(report)
    }
}
