//! The per-symbol window clock state machine.

use crate::error::{ClockError, ClockResult};
use crate::resolver::{ContractResolver, SettlementSource};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use updown_core::{open_epoch_for, Price, Symbol, Window};

/// Clock phases. Transitions only ever step forward through this
/// sequence (wrapping from Settled back to Discovering).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    Idle,
    Discovering,
    Active,
    NearExpiry,
    Settling,
    Settled,
}

/// Lifecycle events, delivered exactly once and in order per window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Open(Window),
    NearExpiry { window_id: String },
    Close { window_id: String },
    Settled {
        window_id: String,
        /// None when the grace period expired without a price.
        final_oracle_price: Option<Price>,
    },
}

/// Window clock configuration.
#[derive(Debug, Clone)]
pub struct WindowClockConfig {
    pub tick_interval_ms: u64,
    /// Entering this close to expiry blocks new entries.
    pub min_time_remaining_ms: i64,
    /// How long to wait for the settlement price after close.
    pub settlement_grace_ms: i64,
}

impl Default for WindowClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            min_time_remaining_ms: 60_000,
            settlement_grace_ms: 30_000,
        }
    }
}

/// Drives one symbol's windows through
/// `discovering -> active -> near-expiry -> settling -> settled`.
pub struct WindowClock {
    config: WindowClockConfig,
    symbol: Symbol,
    resolver: Arc<dyn ContractResolver>,
    settlement: Arc<dyn SettlementSource>,
    events: mpsc::Sender<WindowEvent>,
    phase: WindowPhase,
    current: Option<Window>,
}

impl WindowClock {
    pub fn new(
        config: WindowClockConfig,
        symbol: Symbol,
        resolver: Arc<dyn ContractResolver>,
        settlement: Arc<dyn SettlementSource>,
        events: mpsc::Sender<WindowEvent>,
    ) -> Self {
        Self {
            config,
            symbol,
            resolver,
            settlement,
            events,
            phase: WindowPhase::Idle,
            current: None,
        }
    }

    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    pub fn current_window(&self) -> Option<&Window> {
        self.current.as_ref()
    }

    async fn emit(&self, event: WindowEvent) -> ClockResult<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| ClockError::ChannelClosed)
    }

    /// Take at most one transition for wall-clock `now_ms`.
    ///
    /// Returns true when a transition occurred; the caller loops until
    /// false so that sleeps across boundaries replay every intermediate
    /// transition in order.
    pub async fn step(&mut self, now_ms: i64) -> ClockResult<bool> {
        match self.phase {
            WindowPhase::Idle => {
                self.phase = WindowPhase::Discovering;
                debug!(symbol = %self.symbol, "Clock started");
                Ok(true)
            }

            WindowPhase::Discovering => {
                let open_epoch = open_epoch_for(now_ms / 1000);
                match self.resolver.resolve(&self.symbol, open_epoch).await {
                    Ok(meta) => {
                        let window = Window::new(
                            self.symbol.clone(),
                            open_epoch,
                            meta.strike_price,
                            meta.up_token_id,
                            meta.down_token_id,
                        )?;
                        info!(window_id = %window.window_id, strike = %window.strike_price, "Window open");
                        self.emit(WindowEvent::Open(window.clone())).await?;
                        self.current = Some(window);
                        self.phase = WindowPhase::Active;
                        Ok(true)
                    }
                    Err(e) => {
                        // Stay in discovering; retried on the next tick.
                        warn!(symbol = %self.symbol, ?e, "Contract discovery failed");
                        Ok(false)
                    }
                }
            }

            WindowPhase::Active => {
                let window = self.current.as_ref().expect("active phase has a window");
                if window.time_remaining_ms(now_ms) <= self.config.min_time_remaining_ms {
                    let window_id = window.window_id.clone();
                    debug!(%window_id, "Window near expiry");
                    self.emit(WindowEvent::NearExpiry {
                        window_id: window_id.clone(),
                    })
                    .await?;
                    self.phase = WindowPhase::NearExpiry;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }

            WindowPhase::NearExpiry => {
                let window = self.current.as_ref().expect("near-expiry phase has a window");
                if now_ms >= window.close_epoch * 1000 {
                    let window_id = window.window_id.clone();
                    info!(%window_id, "Window closed");
                    self.emit(WindowEvent::Close {
                        window_id: window_id.clone(),
                    })
                    .await?;
                    self.phase = WindowPhase::Settling;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }

            WindowPhase::Settling => {
                let window = self.current.as_ref().expect("settling phase has a window");
                let window_id = window.window_id.clone();
                let close_epoch = window.close_epoch;
                let grace_deadline_ms = close_epoch * 1000 + self.config.settlement_grace_ms;

                let price = match self.settlement.settlement_price(&self.symbol, close_epoch).await
                {
                    Ok(price) => price,
                    Err(e) => {
                        warn!(%window_id, ?e, "Settlement lookup failed");
                        None
                    }
                };

                match price {
                    Some(price) => {
                        info!(%window_id, %price, "Window settled");
                        self.emit(WindowEvent::Settled {
                            window_id,
                            final_oracle_price: Some(price),
                        })
                        .await?;
                        self.phase = WindowPhase::Settled;
                        Ok(true)
                    }
                    None if now_ms >= grace_deadline_ms => {
                        warn!(%window_id, "Settlement grace expired without a price");
                        self.emit(WindowEvent::Settled {
                            window_id,
                            final_oracle_price: None,
                        })
                        .await?;
                        self.phase = WindowPhase::Settled;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }

            WindowPhase::Settled => {
                let window = self.current.as_ref().expect("settled phase has a window");
                if open_epoch_for(now_ms / 1000) > window.open_epoch {
                    self.phase = WindowPhase::Discovering;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Run the ticker loop until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ClockResult<()> {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    // Drain every due transition so sleeps replay the
                    // full sequence.
                    while self.step(now_ms).await? {}
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!(symbol = %self.symbol, "Window clock stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use updown_core::Price;

    struct FixedResolver;

    #[async_trait]
    impl ContractResolver for FixedResolver {
        async fn resolve(
            &self,
            _symbol: &Symbol,
            open_epoch: i64,
        ) -> ClockResult<crate::resolver::ContractMeta> {
            Ok(crate::resolver::ContractMeta {
                strike_price: Price::new(dec!(50000)),
                up_token_id: format!("up-{open_epoch}"),
                down_token_id: format!("down-{open_epoch}"),
            })
        }
    }

    struct ScriptedSettlement {
        price: Mutex<Option<Price>>,
    }

    #[async_trait]
    impl SettlementSource for ScriptedSettlement {
        async fn settlement_price(
            &self,
            _symbol: &Symbol,
            _close_epoch: i64,
        ) -> ClockResult<Option<Price>> {
            Ok(*self.price.lock())
        }
    }

    fn clock(
        settlement: Arc<ScriptedSettlement>,
    ) -> (WindowClock, mpsc::Receiver<WindowEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let clock = WindowClock::new(
            WindowClockConfig {
                tick_interval_ms: 1_000,
                min_time_remaining_ms: 60_000,
                settlement_grace_ms: 30_000,
            },
            Symbol::new("BTC"),
            Arc::new(FixedResolver),
            settlement,
            tx,
        );
        (clock, rx)
    }

    async fn drain(clock: &mut WindowClock, now_ms: i64) {
        while clock.step(now_ms).await.unwrap() {}
    }

    #[tokio::test]
    async fn test_open_transition() {
        let settlement = Arc::new(ScriptedSettlement {
            price: Mutex::new(None),
        });
        let (mut clock, mut rx) = clock(settlement);

        // Start of a window: 1_700_000_100s is inside window 1_699_999_200.
        drain(&mut clock, 1_700_000_100_000).await;

        assert_eq!(clock.phase(), WindowPhase::Active);
        match rx.try_recv().unwrap() {
            WindowEvent::Open(w) => {
                assert_eq!(w.open_epoch, 1_699_999_200);
                assert_eq!(w.window_id, "BTC-updown-15m-1699999200");
            }
            other => panic!("expected Open, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_lifecycle_in_order() {
        let settlement = Arc::new(ScriptedSettlement {
            price: Mutex::new(None),
        });
        let (mut clock, mut rx) = clock(settlement.clone());

        let open = 1_699_999_200_000i64;
        drain(&mut clock, open + 1_000).await;
        assert_eq!(clock.phase(), WindowPhase::Active);

        // Within 60s of close.
        drain(&mut clock, open + 850_000).await;
        assert_eq!(clock.phase(), WindowPhase::NearExpiry);

        // Past close, no settlement price yet.
        drain(&mut clock, open + 901_000).await;
        assert_eq!(clock.phase(), WindowPhase::Settling);

        // Price arrives.
        *settlement.price.lock() = Some(Price::new(dec!(50100)));
        drain(&mut clock, open + 905_000).await;
        assert_eq!(clock.phase(), WindowPhase::Settled);

        let kinds: Vec<&'static str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| match e {
                WindowEvent::Open(_) => "open",
                WindowEvent::NearExpiry { .. } => "near_expiry",
                WindowEvent::Close { .. } => "close",
                WindowEvent::Settled { .. } => "settled",
            })
            .collect();
        assert_eq!(kinds, vec!["open", "near_expiry", "close", "settled"]);
    }

    #[tokio::test]
    async fn test_sleep_across_boundary_replays_transitions() {
        let settlement = Arc::new(ScriptedSettlement {
            price: Mutex::new(Some(Price::new(dec!(50100)))),
        });
        let (mut clock, mut rx) = clock(settlement);

        let open = 1_699_999_200_000i64;
        drain(&mut clock, open + 1_000).await;

        // Jump straight into the next window: every intermediate
        // transition must still fire, in order, then the next window
        // opens.
        drain(&mut clock, open + 1_000_000).await;

        let kinds: Vec<&'static str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| match e {
                WindowEvent::Open(_) => "open",
                WindowEvent::NearExpiry { .. } => "near_expiry",
                WindowEvent::Close { .. } => "close",
                WindowEvent::Settled { .. } => "settled",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["open", "near_expiry", "close", "settled", "open"]
        );
        assert_eq!(clock.phase(), WindowPhase::Active);
        assert_eq!(
            clock.current_window().unwrap().open_epoch,
            1_700_000_100
        );
    }

    #[tokio::test]
    async fn test_grace_timeout_settles_without_price() {
        let settlement = Arc::new(ScriptedSettlement {
            price: Mutex::new(None),
        });
        let (mut clock, mut rx) = clock(settlement);

        let open = 1_699_999_200_000i64;
        drain(&mut clock, open + 1_000).await;
        drain(&mut clock, open + 901_000).await;
        assert_eq!(clock.phase(), WindowPhase::Settling);

        // Still inside the grace period: no transition.
        drain(&mut clock, open + 910_000).await;
        assert_eq!(clock.phase(), WindowPhase::Settling);

        // Grace (30s) expired.
        drain(&mut clock, open + 931_000).await;
        assert_eq!(clock.phase(), WindowPhase::Settled);

        let settled = std::iter::from_fn(|| rx.try_recv().ok())
            .find_map(|e| match e {
                WindowEvent::Settled {
                    final_oracle_price, ..
                } => Some(final_oracle_price),
                _ => None,
            })
            .unwrap();
        assert!(settled.is_none());
    }
}
