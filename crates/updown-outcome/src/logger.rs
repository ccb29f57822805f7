//! The signal-outcome logger.

use crate::error::OutcomeResult;
use crate::store::OutcomeStore;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use updown_core::{binary_pnl, Outcome, Price, Signal, SignalOutcome};
use uuid::Uuid;

// Entry-price fallback when no market price was recorded. Substitutes
// a midpoint and can mask data loss, so every substitution is logged.
const ENTRY_PRICE_FALLBACK: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

#[derive(Debug, Clone)]
struct Record {
    signal: Signal,
    outcome: Option<SignalOutcome>,
}

type Key = (String, Uuid);

/// Records signals and correlates settlements.
///
/// Idempotent on `(window_id, strategy_id)` within one process. The
/// in-memory table is the query authority; an attached store receives
/// write-through copies for durability.
pub struct SignalOutcomeLogger {
    records: RwLock<HashMap<Key, Record>>,
    store: Option<Arc<dyn OutcomeStore>>,
}

impl SignalOutcomeLogger {
    pub fn new(store: Option<Arc<dyn OutcomeStore>>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Record a signal. Returns false for a duplicate
    /// `(window_id, strategy_id)` pair.
    pub async fn log_signal(&self, signal: Signal) -> OutcomeResult<bool> {
        let key = (signal.window_id.clone(), signal.strategy_id);
        {
            let mut records = self.records.write();
            if records.contains_key(&key) {
                debug!(
                    window_id = %key.0,
                    strategy_id = %key.1,
                    "Duplicate signal ignored"
                );
                return Ok(false);
            }
            records.insert(
                key,
                Record {
                    signal: signal.clone(),
                    outcome: None,
                },
            );
        }

        if let Some(store) = &self.store {
            store.insert_signal(&signal).await?;
        }
        Ok(true)
    }

    /// Correlate a settled window with its signals.
    ///
    /// Computes `settlement_outcome = final >= strike ? up : down`,
    /// `signal_correct` under fade semantics, and the binary payoff
    /// P&L. Returns whether any row was updated; a window with no
    /// signals logs at debug and returns false.
    pub async fn settle_window(
        &self,
        window_id: &str,
        strike: Price,
        final_oracle_price: Price,
        exit_price: Option<Price>,
    ) -> OutcomeResult<bool> {
        let outcome = Outcome::from_settlement(final_oracle_price, strike);

        let pending: Vec<(Key, Signal)> = {
            let records = self.records.read();
            records
                .iter()
                .filter(|((window, _), record)| {
                    window.as_str() == window_id && record.outcome.is_none()
                })
                .map(|(key, record)| (key.clone(), record.signal.clone()))
                .collect()
        };

        if pending.is_empty() {
            debug!(window_id, "No signal logged for settled window");
            return Ok(false);
        }

        let mut settled = Vec::with_capacity(pending.len());
        for (key, signal) in pending {
            let correct = signal.direction.winning_outcome() == outcome;

            let entry_price = match signal.inputs.market_price {
                Some(price) => price,
                None => {
                    warn!(
                        window_id,
                        strategy_id = %signal.strategy_id,
                        "No entry price recorded, substituting 0.5"
                    );
                    Price::new(ENTRY_PRICE_FALLBACK)
                }
            };
            let pnl = binary_pnl(correct, entry_price, signal.size);

            let outcome_row = SignalOutcome {
                signal,
                final_oracle_price,
                settlement_outcome: outcome,
                signal_correct: correct,
                exit_price,
                pnl,
                settled_at: Utc::now(),
            };
            settled.push((key, outcome_row));
        }

        {
            let mut records = self.records.write();
            for (key, outcome_row) in &settled {
                if let Some(record) = records.get_mut(key) {
                    record.outcome = Some(outcome_row.clone());
                }
            }
        }

        if let Some(store) = &self.store {
            for (_, outcome_row) in &settled {
                store.update_outcome(outcome_row).await?;
            }
        }

        debug!(window_id, rows = settled.len(), %outcome, "Window outcomes recorded");
        Ok(true)
    }

    /// All recorded signals with any settled outcome, newest first.
    pub(crate) fn rows(&self) -> Vec<(Signal, Option<SignalOutcome>)> {
        let records = self.records.read();
        let mut rows: Vec<(Signal, Option<SignalOutcome>)> = records
            .values()
            .map(|r| (r.signal.clone(), r.outcome.clone()))
            .collect();
        rows.sort_by(|a, b| b.0.generated_at.cmp(&a.0.generated_at));
        rows
    }

    /// Total realized P&L across settled signals.
    pub fn total_pnl(&self) -> Decimal {
        self.records
            .read()
            .values()
            .filter_map(|r| r.outcome.as_ref().map(|o| o.pnl))
            .sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::{Direction, OrderSide, SignalInputs, Size, Symbol};

    pub(crate) fn signal(
        window_id: &str,
        strategy_id: Uuid,
        direction: Direction,
        entry: Option<Decimal>,
    ) -> Signal {
        Signal {
            strategy_id,
            window_id: window_id.to_string(),
            symbol: Symbol::new("BTC"),
            direction,
            confidence: 0.8,
            token_id: "down-tok".into(),
            side: OrderSide::Buy,
            size: Size::ONE,
            inputs: SignalInputs {
                time_remaining_ms: 300_000,
                market_price: entry.map(Price::new),
                ui_price: None,
                oracle_price: Some(Price::new(dec!(50000))),
                oracle_staleness_ms: 500,
                spread_pct: None,
                strike: Some(Price::new(dec!(0.50))),
                staleness_score: 0.1,
            },
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_settlement_outcome_down_correct() {
        let logger = SignalOutcomeLogger::new(None);
        let sid = Uuid::new_v4();
        logger
            .log_signal(signal("w1", sid, Direction::FadeUp, Some(dec!(0.30))))
            .await
            .unwrap();

        // final 0.48 < strike 0.50: outcome down, fade_up correct.
        let updated = logger
            .settle_window("w1", Price::new(dec!(0.50)), Price::new(dec!(0.48)), None)
            .await
            .unwrap();
        assert!(updated);

        let rows = logger.rows();
        let outcome = rows[0].1.as_ref().unwrap();
        assert_eq!(outcome.settlement_outcome, Outcome::Down);
        assert!(outcome.signal_correct);
        assert_eq!(outcome.pnl, dec!(0.70));
    }

    #[tokio::test]
    async fn test_settlement_outcome_up_incorrect() {
        let logger = SignalOutcomeLogger::new(None);
        let sid = Uuid::new_v4();
        logger
            .log_signal(signal("w1", sid, Direction::FadeUp, Some(dec!(0.30))))
            .await
            .unwrap();

        let updated = logger
            .settle_window("w1", Price::new(dec!(0.50)), Price::new(dec!(0.55)), None)
            .await
            .unwrap();
        assert!(updated);

        let outcome = logger.rows()[0].1.clone().unwrap();
        assert_eq!(outcome.settlement_outcome, Outcome::Up);
        assert!(!outcome.signal_correct);
        assert_eq!(outcome.pnl, dec!(-0.30));
    }

    #[tokio::test]
    async fn test_idempotent_per_window_strategy() {
        let logger = SignalOutcomeLogger::new(None);
        let sid = Uuid::new_v4();
        assert!(logger
            .log_signal(signal("w1", sid, Direction::FadeUp, Some(dec!(0.3))))
            .await
            .unwrap());
        assert!(!logger
            .log_signal(signal("w1", sid, Direction::FadeDown, Some(dec!(0.4))))
            .await
            .unwrap());
        // Different strategy, same window: accepted.
        assert!(logger
            .log_signal(signal("w1", Uuid::new_v4(), Direction::FadeUp, Some(dec!(0.3))))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_settle_unknown_window_returns_false() {
        let logger = SignalOutcomeLogger::new(None);
        let updated = logger
            .settle_window("w-missing", Price::new(dec!(0.5)), Price::new(dec!(0.4)), None)
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn test_missing_entry_price_falls_back_to_half() {
        let logger = SignalOutcomeLogger::new(None);
        logger
            .log_signal(signal("w1", Uuid::new_v4(), Direction::FadeUp, None))
            .await
            .unwrap();

        logger
            .settle_window("w1", Price::new(dec!(0.50)), Price::new(dec!(0.40)), None)
            .await
            .unwrap();
        // Correct fade at the substituted 0.5 entry: pnl = 0.5.
        assert_eq!(logger.total_pnl(), dec!(0.5));
    }

    #[tokio::test]
    async fn test_double_settlement_is_noop() {
        let logger = SignalOutcomeLogger::new(None);
        logger
            .log_signal(signal("w1", Uuid::new_v4(), Direction::FadeUp, Some(dec!(0.3))))
            .await
            .unwrap();

        assert!(logger
            .settle_window("w1", Price::new(dec!(0.5)), Price::new(dec!(0.4)), None)
            .await
            .unwrap());
        // Second settlement finds no pending rows.
        assert!(!logger
            .settle_window("w1", Price::new(dec!(0.5)), Price::new(dec!(0.4)), None)
            .await
            .unwrap());
    }
}
