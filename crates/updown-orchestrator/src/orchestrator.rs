//! The orchestrator task.
//!
//! Consumes window-clock events, drives every manifest strategy once
//! per tick against the current snapshot, submits gated entries,
//! honors exits, and finalizes settlement. Evaluations for one
//! `(strategy, window)` pair are serialized by construction: the
//! orchestrator is a single task and components never suspend.

use crate::error::OrchResult;
use crate::gates::{check_entry_gates, GateInputs};
use crate::inflight::InflightRegistry;
use crate::positions::{PositionBook, PositionStore};
use crate::price_view::MarketPriceView;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use updown_clock::WindowEvent;
use updown_core::{
    Direction, MarketSnapshot, Outcome, OrderSide, Position, Price, Signal, SignalInputs, Size,
    StrategyInstance, Symbol, Window,
};
use updown_exec::{ExecutionClient, OrderRequest, OrderStatus, TradingMode};
use updown_feed::MarketStateHandle;
use updown_outcome::SignalOutcomeLogger;
use updown_registry::{DecisionAction, EvalContext, PositionContext, Registry};
use updown_safety::SafetyMonitor;
use updown_telemetry::metrics;
use uuid::Uuid;

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub tick_interval_ms: u64,
    /// Mirror of the clock's near-expiry margin, for gate reporting.
    pub min_time_remaining_ms: i64,
    pub inflight_timeout_ms: u64,
    /// Venue minimum order size, in contracts.
    pub venue_min_size: Size,
    pub mode: TradingMode,
    /// Strategy names from the launch manifest.
    pub allowed_strategies: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            min_time_remaining_ms: 60_000,
            inflight_timeout_ms: 10_000,
            venue_min_size: Size::new(Decimal::from(5)),
            mode: TradingMode::Paper,
            allowed_strategies: Vec::new(),
        }
    }
}

/// The orchestrator.
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<Registry>,
    market: MarketStateHandle,
    exec: Arc<dyn ExecutionClient>,
    outcomes: Arc<SignalOutcomeLogger>,
    safety: Arc<SafetyMonitor>,
    price_view: Arc<MarketPriceView>,
    positions: PositionBook,
    inflight: InflightRegistry,
    /// One active window per symbol.
    active_windows: RwLock<HashMap<Symbol, Window>>,
    /// Windows currently in the near-expiry substate.
    near_expiry: RwLock<HashSet<String>>,
    /// Every window seen this run, for settlement lookup.
    windows_by_id: RwLock<HashMap<String, Window>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        registry: Arc<Registry>,
        market: MarketStateHandle,
        exec: Arc<dyn ExecutionClient>,
        outcomes: Arc<SignalOutcomeLogger>,
        safety: Arc<SafetyMonitor>,
        price_view: Arc<MarketPriceView>,
        position_store: Option<Arc<dyn PositionStore>>,
    ) -> Self {
        let inflight = InflightRegistry::new(config.inflight_timeout_ms);
        Self {
            config,
            registry,
            market,
            exec,
            outcomes,
            safety,
            price_view,
            positions: PositionBook::new(position_store),
            inflight,
            active_windows: RwLock::new(HashMap::new()),
            near_expiry: RwLock::new(HashSet::new()),
            windows_by_id: RwLock::new(HashMap::new()),
        }
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    pub fn inflight(&self) -> &InflightRegistry {
        &self.inflight
    }

    /// Re-bind persisted open positions before accepting any tick.
    pub async fn recover(&self) -> OrchResult<usize> {
        let active_ids: Vec<Uuid> = self
            .allowed_strategies()
            .iter()
            .map(|s| s.id)
            .collect();
        self.positions.recover(&active_ids).await
    }

    fn allowed_strategies(&self) -> Vec<Arc<StrategyInstance>> {
        self.config
            .allowed_strategies
            .iter()
            .filter_map(|name| self.registry.find_by_name(name))
            .collect()
    }

    /// Apply one window-clock event.
    pub async fn handle_event(&self, event: WindowEvent) {
        match event {
            WindowEvent::Open(window) => {
                info!(window_id = %window.window_id, "Orchestrator tracking window");
                self.market.set_window(
                    &window.symbol,
                    window.up_token_id.clone(),
                    window.down_token_id.clone(),
                    window.strike_price,
                );
                self.price_view.bind_window(
                    &window.symbol,
                    &window.up_token_id,
                    &window.down_token_id,
                );
                self.windows_by_id
                    .write()
                    .insert(window.window_id.clone(), window.clone());
                self.active_windows
                    .write()
                    .insert(window.symbol.clone(), window);
            }
            WindowEvent::NearExpiry { window_id } => {
                debug!(%window_id, "Near-expiry substate entered");
                self.near_expiry.write().insert(window_id);
            }
            WindowEvent::Close { window_id } => {
                let symbol = self
                    .windows_by_id
                    .read()
                    .get(&window_id)
                    .map(|w| w.symbol.clone());
                if let Some(symbol) = symbol {
                    let mut active = self.active_windows.write();
                    if active
                        .get(&symbol)
                        .map(|w| w.window_id == window_id)
                        .unwrap_or(false)
                    {
                        active.remove(&symbol);
                    }
                }
            }
            WindowEvent::Settled {
                window_id,
                final_oracle_price,
            } => {
                if let Err(e) = self.settle(&window_id, final_oracle_price).await {
                    error!(%window_id, ?e, "Settlement failed");
                }
            }
        }
    }

    /// One tick: sweep timeouts, exit orphans, evaluate strategies.
    pub async fn on_tick(&self) {
        self.sweep_inflight().await;
        self.exit_orphans().await;

        let windows: Vec<Window> = self.active_windows.read().values().cloned().collect();
        let strategies = self.allowed_strategies();

        for window in &windows {
            for strategy in &strategies {
                self.evaluate(strategy, window).await;
            }
        }
    }

    fn build_inputs(&self, snapshot: &MarketSnapshot, window: &Window, held_up: bool) -> SignalInputs {
        let book = if held_up {
            snapshot.up_book
        } else {
            snapshot.down_book
        };
        let stale_sources = snapshot
            .sources
            .values()
            .filter(|q| q.age_ms > 5_000)
            .count();
        let total_sources = snapshot.sources.len().max(1);

        SignalInputs {
            time_remaining_ms: window.time_remaining_ms(Utc::now().timestamp_millis()),
            market_price: book.map(|b| b.best_ask),
            ui_price: book.and_then(|b| b.mid()),
            oracle_price: snapshot.oracle().map(|q| q.price),
            oracle_staleness_ms: snapshot.oracle_staleness_ms(),
            spread_pct: book.and_then(|b| b.spread_pct()),
            strike: snapshot.strike,
            staleness_score: stale_sources as f64 / total_sources as f64,
        }
    }

    /// Per-tick procedure for one (strategy, window) pair.
    async fn evaluate(&self, strategy: &Arc<StrategyInstance>, window: &Window) {
        let Some(snapshot) = self.market.snapshot(&window.symbol) else {
            return;
        };
        let now_ms = Utc::now().timestamp_millis();
        let existing = self.positions.get(strategy.id, &window.window_id);

        let ctx = EvalContext {
            window: window.clone(),
            snapshot: snapshot.clone(),
            time_remaining_ms: window.time_remaining_ms(now_ms),
            now_ms,
            position: existing.as_ref().map(|p| PositionContext {
                entry_price: p.entry_price,
                side: p.side,
                held_up: p.token_id == window.up_token_id,
            }),
        };

        let decision = match self.registry.execute_strategy(strategy.id, &ctx) {
            Ok(decision) => decision,
            Err(e) => {
                // Evaluation failures drop the tick, never the process.
                warn!(
                    strategy = %strategy.name,
                    window_id = %window.window_id,
                    code = %e.code,
                    "Strategy evaluation failed"
                );
                return;
            }
        };

        match existing {
            Some(position) => {
                // Holding: only exit actions are honored.
                if decision.action == DecisionAction::Exit
                    && position.status == updown_core::PositionStatus::Open
                {
                    if let Err(e) = self
                        .exit_position(strategy.id, window, "strategy_exit")
                        .await
                    {
                        error!(?e, window_id = %window.window_id, "Exit failed");
                    }
                }
            }
            None => {
                if decision.action == DecisionAction::Enter {
                    self.try_enter(strategy, window, &snapshot, &decision).await;
                }
            }
        }
    }

    async fn try_enter(
        &self,
        strategy: &Arc<StrategyInstance>,
        window: &Window,
        snapshot: &MarketSnapshot,
        decision: &updown_registry::StrategyDecision,
    ) {
        let direction = match decision.direction.as_deref() {
            Some("fade_up") => Direction::FadeUp,
            Some("fade_down") => Direction::FadeDown,
            other => {
                debug!(?other, "Entry without a fade direction, skipping");
                return;
            }
        };

        // A fade buys the token of the outcome it bets on.
        let held_up = direction == Direction::FadeDown;
        let token_id = window.token_for(held_up).to_string();
        let book = if held_up {
            snapshot.up_book
        } else {
            snapshot.down_book
        };
        let Some(book) = book else {
            debug!(window_id = %window.window_id, "No book for entry token, skipping");
            return;
        };
        if !book.best_ask.is_positive() {
            return;
        }

        // Sizing output is dollars; convert at the ask.
        let contracts = Size::new(
            (decision.size / book.best_ask.inner()).round_dp(2),
        );
        let cost = contracts.notional(book.best_ask);

        let gate_inputs = GateInputs {
            near_expiry: self.near_expiry.read().contains(&window.window_id),
            strategy_allowed: self
                .config
                .allowed_strategies
                .contains(&strategy.name),
            strategy_name: &strategy.name,
            safety_tripped: self.safety.is_tripped(),
            would_exceed_exposure: self.safety.would_exceed_exposure(cost),
            proposed_cost: cost,
            slot_occupied: self.positions.has_live(strategy.id, &window.window_id),
            config_mode: self.config.mode,
            adapter_mode: self.exec.mode(),
            size: contracts,
            venue_min_size: self.config.venue_min_size,
        };
        if let Err(block) = check_entry_gates(&gate_inputs) {
            debug!(
                strategy = %strategy.name,
                window_id = %window.window_id,
                gate = block.gate,
                reason = %block.reason,
                "Entry blocked"
            );
            return;
        }

        let signal = Signal {
            strategy_id: strategy.id,
            window_id: window.window_id.clone(),
            symbol: window.symbol.clone(),
            direction,
            confidence: decision.confidence.unwrap_or(0.0),
            token_id: token_id.clone(),
            side: OrderSide::Buy,
            size: contracts,
            inputs: self.build_inputs(snapshot, window, held_up),
            generated_at: Utc::now(),
        };

        // The signal is persisted before the order goes out.
        match self.outcomes.log_signal(signal.clone()).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(window_id = %window.window_id, "Signal already logged this window, skipping entry");
                return;
            }
            Err(e) => {
                error!(?e, "Signal persistence failed, order not sent");
                return;
            }
        }
        let direction_label = direction.to_string();
        metrics::SIGNALS_TOTAL
            .with_label_values(&[strategy.name.as_str(), direction_label.as_str()])
            .inc();

        let request_id = self.inflight.track(strategy.id, &window.window_id);
        let order = OrderRequest {
            token_id: token_id.clone(),
            side: OrderSide::Buy,
            price: book.best_ask,
            size: contracts,
        };

        let placed = tokio::time::timeout(
            Duration::from_millis(self.config.inflight_timeout_ms),
            self.exec.place_order(order),
        )
        .await;

        match placed {
            Ok(Ok(placed)) => {
                self.inflight
                    .set_order_id(strategy.id, &window.window_id, request_id, &placed.order_id);
                metrics::ORDERS_TOTAL.with_label_values(&["submitted"]).inc();

                if placed.status == OrderStatus::Matched {
                    let fill_price = placed.fill_price.unwrap_or(book.best_ask);
                    let position = Position::open(
                        strategy.id,
                        window.window_id.clone(),
                        token_id,
                        OrderSide::Buy,
                        placed.taking,
                        fill_price,
                    );
                    let cost = position.cost();
                    if let Err(e) = self.positions.open(position).await {
                        error!(?e, "Fill arrived for an occupied slot");
                    } else {
                        self.safety.on_fill(cost);
                        info!(
                            strategy = %strategy.name,
                            window_id = %window.window_id,
                            %fill_price,
                            size = %placed.taking,
                            "Position opened"
                        );
                    }
                    self.inflight.resolve(strategy.id, &window.window_id, request_id);
                }
                // A resting order stays in-flight until acknowledged
                // or swept at its deadline.
            }
            Ok(Err(e)) => {
                metrics::ORDERS_TOTAL.with_label_values(&["rejected"]).inc();
                warn!(code = %e.code(), error = %e, "Order rejected");
                self.inflight.resolve(strategy.id, &window.window_id, request_id);
            }
            Err(_) => {
                metrics::ORDERS_TOTAL.with_label_values(&["timeout"]).inc();
                warn!(window_id = %window.window_id, "Order submission timed out");
                // Cancel handled by the sweep once the venue id shows up,
                // or dropped if it never does.
                self.inflight.resolve(strategy.id, &window.window_id, request_id);
            }
        }
    }

    /// Liquidate a held position at the bid.
    async fn exit_position(
        &self,
        strategy_id: Uuid,
        window: &Window,
        reason: &str,
    ) -> OrchResult<()> {
        let position = self.positions.mark_closing(strategy_id, &window.window_id).await?;
        let held_up = position.token_id == window.up_token_id;
        let book = self
            .market
            .snapshot(&window.symbol)
            .and_then(|s| if held_up { s.up_book } else { s.down_book });

        let Some(book) = book else {
            warn!(window_id = %window.window_id, "No book to exit into, staying in closing");
            return Ok(());
        };
        if !book.best_bid.is_positive() {
            return Ok(());
        }

        let order = OrderRequest {
            token_id: position.token_id.clone(),
            side: OrderSide::Sell,
            price: book.best_bid,
            size: position.size,
        };
        let placed = self.exec.place_order(order).await?;

        if placed.status == OrderStatus::Matched {
            let exit_price = placed.fill_price.unwrap_or(book.best_bid);
            let closed = self
                .positions
                .close(strategy_id, &window.window_id, Some(exit_price), reason)
                .await?;
            let pnl = (exit_price.inner() - closed.entry_price.inner()) * closed.size.inner();
            self.safety.on_position_closed(closed.cost(), pnl);
            info!(
                window_id = %window.window_id,
                %exit_price,
                %pnl,
                reason,
                "Position exited"
            );
        }
        Ok(())
    }

    /// Orphan slots exit at the first opportunity.
    async fn exit_orphans(&self) {
        for (strategy_id, window_id) in self.positions.orphans() {
            let window = self.windows_by_id.read().get(&window_id).cloned();
            let Some(window) = window else { continue };
            if let Err(e) = self.exit_position(strategy_id, &window, "orphan").await {
                warn!(?e, %window_id, "Orphan exit failed");
            }
        }
    }

    /// Cancel orders past their in-flight deadline.
    async fn sweep_inflight(&self) {
        for expired in self.inflight.sweep_expired() {
            metrics::ORDERS_TOTAL.with_label_values(&["timeout"]).inc();
            if let Some(order_id) = &expired.order_id {
                warn!(order_id, "In-flight deadline expired, cancelling");
                if let Err(e) = self.exec.cancel(order_id).await {
                    warn!(?e, order_id, "Cancel after timeout failed");
                }
            }
        }
    }

    /// Finalize a settled window: binary payouts, P&L, outcomes.
    pub async fn settle(&self, window_id: &str, final_price: Option<Price>) -> OrchResult<()> {
        let window = self.windows_by_id.read().get(window_id).cloned();
        let Some(window) = window else {
            debug!(window_id, "Settlement for unknown window");
            return Ok(());
        };

        for position in self.positions.positions_for_window(window_id) {
            let held_up = position.token_id == window.up_token_id;
            match final_price {
                Some(price) => {
                    let outcome = Outcome::from_settlement(price, window.strike_price);
                    let payout = position.settlement_payout(held_up, outcome);
                    let pnl = position.settlement_pnl(held_up, outcome);
                    let closed = self
                        .positions
                        .close(position.strategy_id, window_id, Some(payout), "settlement")
                        .await?;
                    self.safety.on_position_closed(closed.cost(), pnl);
                    metrics::WINDOWS_SETTLED_TOTAL
                        .with_label_values(&[window.symbol.as_str(), &outcome.to_string()])
                        .inc();
                    info!(
                        window_id,
                        strategy_id = %position.strategy_id,
                        %outcome,
                        %pnl,
                        "Position settled"
                    );
                }
                None => {
                    warn!(window_id, "Settling without an oracle price, flat close");
                    self.positions
                        .close(position.strategy_id, window_id, None, "no_settlement_price")
                        .await?;
                    self.safety
                        .on_position_closed(position.cost(), Decimal::ZERO);
                }
            }
        }

        if let Some(price) = final_price {
            self.outcomes
                .settle_window(window_id, window.strike_price, price, None)
                .await?;
        }

        self.near_expiry.write().remove(window_id);
        self.windows_by_id.write().remove(window_id);
        Ok(())
    }

    /// Run until shutdown: clock events, ticks, timeout sweeps.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<WindowEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval =
            tokio::time::interval(Duration::from_millis(self.config.tick_interval_ms));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("Window event channel closed");
                            return;
                        }
                    }
                }
                _ = interval.tick() => {
                    self.on_tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Orchestrator stopped");
                        return;
                    }
                }
            }
        }
    }
}
