//! Auto-stop: exposure and P&L accounting with a trip latch.
//!
//! Once tripped, the latch stays tripped until manually reset: new
//! entries are rejected while existing positions ride to natural
//! expiry. The safety task is the single writer; readers get copies.

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use updown_core::AutoStopState;
use updown_telemetry::metrics;

/// Auto-stop thresholds.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub max_exposure_dollars: Decimal,
    /// Daily realized loss that trips the stop.
    pub max_daily_loss_dollars: Decimal,
    /// Drawdown from the high-water mark that trips the stop.
    pub max_drawdown_dollars: Decimal,
    /// Cadence of the periodic evaluation task.
    pub refresh_interval_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_exposure_dollars: Decimal::from(500),
            max_daily_loss_dollars: Decimal::from(100),
            max_drawdown_dollars: Decimal::from(150),
            refresh_interval_ms: 5_000,
        }
    }
}

/// Why the auto-stop tripped.
#[derive(Debug, Clone, PartialEq)]
pub enum TripReason {
    DailyLossExceeded { loss: Decimal },
    DrawdownExceeded { drawdown: Decimal },
    Manual { message: String },
}

impl std::fmt::Display for TripReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyLossExceeded { loss } => write!(f, "Daily loss exceeded: ${loss}"),
            Self::DrawdownExceeded { drawdown } => write!(f, "Drawdown exceeded: ${drawdown}"),
            Self::Manual { message } => write!(f, "Manual: {message}"),
        }
    }
}

struct Accounting {
    total_exposure: Decimal,
    realized_pnl_today: Decimal,
    unrealized_pnl: Decimal,
    /// High-water mark of cumulative realized P&L.
    hwm: Decimal,
    cumulative_pnl: Decimal,
    tripped_reason: Option<String>,
}

/// The safety monitor.
pub struct SafetyMonitor {
    config: SafetyConfig,
    accounting: RwLock<Accounting>,
    tripped: AtomicBool,
}

impl SafetyMonitor {
    pub fn new(config: SafetyConfig) -> Self {
        Self {
            config,
            accounting: RwLock::new(Accounting {
                total_exposure: Decimal::ZERO,
                realized_pnl_today: Decimal::ZERO,
                unrealized_pnl: Decimal::ZERO,
                hwm: Decimal::ZERO,
                cumulative_pnl: Decimal::ZERO,
                tripped_reason: None,
            }),
            tripped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Immutable copy of the current state, for persistence and the
    /// last-known-state file.
    pub fn state(&self) -> AutoStopState {
        let acc = self.accounting.read();
        AutoStopState {
            total_exposure: acc.total_exposure,
            realized_pnl_today: acc.realized_pnl_today,
            unrealized_pnl: acc.unrealized_pnl,
            drawdown_from_hwm: acc.hwm - acc.cumulative_pnl,
            tripped: self.is_tripped(),
            tripped_reason: acc.tripped_reason.clone(),
            updated_at: Utc::now(),
        }
    }

    /// Would `cost` more dollars of exposure break the cap?
    pub fn would_exceed_exposure(&self, cost: Decimal) -> bool {
        self.accounting.read().total_exposure + cost > self.config.max_exposure_dollars
    }

    /// A fill opened exposure.
    pub fn on_fill(&self, cost: Decimal) {
        let mut acc = self.accounting.write();
        acc.total_exposure += cost;
        metrics::EXPOSURE_DOLLARS.set(
            acc.total_exposure
                .to_string()
                .parse::<f64>()
                .unwrap_or(0.0),
        );
    }

    /// A position closed: release its exposure, book realized P&L.
    pub fn on_position_closed(&self, cost: Decimal, pnl: Decimal) {
        {
            let mut acc = self.accounting.write();
            acc.total_exposure = (acc.total_exposure - cost).max(Decimal::ZERO);
            acc.realized_pnl_today += pnl;
            acc.cumulative_pnl += pnl;
            if acc.cumulative_pnl > acc.hwm {
                acc.hwm = acc.cumulative_pnl;
            }
            metrics::EXPOSURE_DOLLARS.set(
                acc.total_exposure
                    .to_string()
                    .parse::<f64>()
                    .unwrap_or(0.0),
            );
        }
        self.evaluate();
    }

    /// Refresh the unrealized P&L estimate (called on a cadence).
    pub fn set_unrealized(&self, pnl: Decimal) {
        self.accounting.write().unrealized_pnl = pnl;
    }

    /// Evaluate thresholds; trips when any is breached.
    pub fn evaluate(&self) {
        if self.is_tripped() {
            return;
        }
        let (daily_loss, drawdown) = {
            let acc = self.accounting.read();
            (-acc.realized_pnl_today, acc.hwm - acc.cumulative_pnl)
        };

        if daily_loss > self.config.max_daily_loss_dollars {
            self.trip(TripReason::DailyLossExceeded { loss: daily_loss });
        } else if drawdown > self.config.max_drawdown_dollars {
            self.trip(TripReason::DrawdownExceeded { drawdown });
        }
    }

    /// Trip the latch. A second trip keeps the original reason.
    pub fn trip(&self, reason: TripReason) {
        if self
            .tripped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.accounting.write().tripped_reason = Some(reason.to_string());
            metrics::AUTO_STOP_TRIPPED.set(1.0);
            error!(reason = %reason, "AUTO-STOP TRIPPED - new entries rejected");
        } else {
            warn!(new_reason = %reason, "Auto-stop already tripped, keeping original reason");
        }
    }

    /// Manual reset by an operator. Auto-reset is prohibited.
    pub fn reset(&self) {
        if self.is_tripped() {
            let previous = self.accounting.write().tripped_reason.take();
            self.tripped.store(false, Ordering::SeqCst);
            metrics::AUTO_STOP_TRIPPED.set(0.0);
            info!(?previous, "Auto-stop manually reset");
        }
    }

    /// Reset the daily realized counter at the day boundary.
    pub fn roll_day(&self) {
        let mut acc = self.accounting.write();
        info!(realized = %acc.realized_pnl_today, "Daily P&L rolled");
        acc.realized_pnl_today = Decimal::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn monitor() -> SafetyMonitor {
        SafetyMonitor::new(SafetyConfig {
            max_exposure_dollars: dec!(500),
            max_daily_loss_dollars: dec!(100),
            max_drawdown_dollars: dec!(150),
            refresh_interval_ms: 1_000,
        })
    }

    #[test]
    fn test_exposure_accounting() {
        let m = monitor();
        assert!(!m.would_exceed_exposure(dec!(500)));
        assert!(m.would_exceed_exposure(dec!(501)));

        m.on_fill(dec!(300));
        assert!(m.would_exceed_exposure(dec!(201)));
        assert!(!m.would_exceed_exposure(dec!(200)));

        m.on_position_closed(dec!(300), dec!(10));
        assert_eq!(m.state().total_exposure, Decimal::ZERO);
        assert_eq!(m.state().realized_pnl_today, dec!(10));
    }

    #[test]
    fn test_daily_loss_trips() {
        let m = monitor();
        m.on_position_closed(dec!(50), dec!(-60));
        assert!(!m.is_tripped());

        m.on_position_closed(dec!(50), dec!(-50));
        assert!(m.is_tripped());
        let state = m.state();
        assert!(state.tripped);
        assert!(state.tripped_reason.unwrap().contains("Daily loss"));
    }

    #[test]
    fn test_drawdown_from_hwm_trips() {
        let m = monitor();
        // Build a high-water mark of +200.
        m.on_position_closed(dec!(10), dec!(200));
        assert!(!m.is_tripped());

        // Give back 160 (> 150 drawdown) while daily stays positive.
        m.on_position_closed(dec!(10), dec!(-160));
        assert!(m.is_tripped());
        assert!(m
            .state()
            .tripped_reason
            .unwrap()
            .contains("Drawdown"));
    }

    #[test]
    fn test_trip_keeps_first_reason() {
        let m = monitor();
        m.trip(TripReason::Manual {
            message: "first".into(),
        });
        m.trip(TripReason::Manual {
            message: "second".into(),
        });
        assert_eq!(m.state().tripped_reason.unwrap(), "Manual: first");
    }

    #[test]
    fn test_manual_reset() {
        let m = monitor();
        m.trip(TripReason::Manual {
            message: "drill".into(),
        });
        assert!(m.is_tripped());
        m.reset();
        assert!(!m.is_tripped());
        assert!(m.state().tripped_reason.is_none());
    }

    #[test]
    fn test_roll_day_clears_daily_only() {
        let m = monitor();
        m.on_position_closed(dec!(10), dec!(-40));
        m.roll_day();
        let state = m.state();
        assert_eq!(state.realized_pnl_today, Decimal::ZERO);
        // Drawdown memory survives the roll.
        assert_eq!(state.drawdown_from_hwm, dec!(40));
    }
}
