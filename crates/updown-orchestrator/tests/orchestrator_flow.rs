//! End-to-end orchestrator scenarios over the paper executor.

use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use updown_clock::WindowEvent;
use updown_core::{
    BookLevel, BookUpdate, ComponentSlots, ComponentType, Outcome, Price, Size, Symbol, Tick,
    TickSource, Window,
};
use updown_exec::{PaperExecutor, SlippageModel, TradingMode};
use updown_feed::{MarketStateHandle, MarketStateStore};
use updown_orchestrator::{MarketPriceView, Orchestrator, OrchestratorConfig};
use updown_outcome::SignalOutcomeLogger;
use updown_registry::{
    ComponentMetadata, ComponentModel, ConfigValidation, EvalContext, Registry, StageResults,
};
use updown_safety::{SafetyConfig, SafetyMonitor, TripReason};
use uuid::Uuid;

struct Stub(Value);

impl ComponentModel for Stub {
    fn evaluate(
        &self,
        _ctx: &EvalContext,
        _config: &Value,
        _prev: &StageResults,
    ) -> Result<Value, String> {
        Ok(self.0.clone())
    }

    fn validate_config(&self, _config: &Value) -> ConfigValidation {
        ConfigValidation::ok()
    }
}

/// Exit stub: exits whenever a position is held.
struct ExitWhenHolding;

impl ComponentModel for ExitWhenHolding {
    fn evaluate(
        &self,
        ctx: &EvalContext,
        _config: &Value,
        _prev: &StageResults,
    ) -> Result<Value, String> {
        Ok(json!({"shouldExit": ctx.position.is_some()}))
    }

    fn validate_config(&self, _config: &Value) -> ConfigValidation {
        ConfigValidation::ok()
    }
}

struct Harness {
    registry: Arc<Registry>,
    market: MarketStateHandle,
    safety: Arc<SafetyMonitor>,
    outcomes: Arc<SignalOutcomeLogger>,
    orchestrator: Arc<Orchestrator>,
    strategy_id: Uuid,
    window: Window,
}

async fn harness(exit_on_hold: bool) -> Harness {
    let registry = Arc::new(Registry::new(None));
    registry
        .create_component_version(
            ComponentMetadata::new(ComponentType::Probability, "stub", 1),
            Arc::new(Stub(json!({"probability": 0.5, "confidence": 0.9}))),
        )
        .unwrap();
    registry
        .create_component_version(
            ComponentMetadata::new(ComponentType::Entry, "stub", 1),
            Arc::new(Stub(json!({"shouldEnter": true, "direction": "fade_up"}))),
        )
        .unwrap();
    registry
        .create_component_version(
            ComponentMetadata::new(ComponentType::Sizing, "stub", 1),
            Arc::new(Stub(json!({"adjustedSize": 30}))),
        )
        .unwrap();
    let exit_model: Arc<dyn ComponentModel> = if exit_on_hold {
        Arc::new(ExitWhenHolding)
    } else {
        Arc::new(Stub(json!({"shouldExit": false})))
    };
    registry
        .create_component_version(
            ComponentMetadata::new(ComponentType::Exit, "stub", 1),
            exit_model,
        )
        .unwrap();

    let strategy_id = registry
        .create_strategy(
            "fader",
            ComponentSlots {
                probability: "prob-stub-v1".into(),
                entry: "entry-stub-v1".into(),
                sizing: "sizing-stub-v1".into(),
                exit: "exit-stub-v1".into(),
            },
            json!({}),
        )
        .await
        .unwrap();

    let market = MarketStateStore::new();
    let price_view = MarketPriceView::new(market.clone());
    let exec = Arc::new(PaperExecutor::new(
        price_view.clone(),
        SlippageModel {
            slippage: rust_decimal::Decimal::ZERO,
        },
        dec!(1000),
    ));
    let safety = Arc::new(SafetyMonitor::new(SafetyConfig::default()));
    let outcomes = Arc::new(SignalOutcomeLogger::new(None));

    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorConfig {
            allowed_strategies: vec!["fader".into()],
            venue_min_size: Size::new(dec!(1)),
            mode: TradingMode::Paper,
            ..Default::default()
        },
        registry.clone(),
        market.clone(),
        exec,
        outcomes.clone(),
        safety.clone(),
        price_view,
        None,
    ));

    let window = Window::new(
        Symbol::new("BTC"),
        1_699_999_200,
        Price::new(dec!(50000)),
        "up-tok".into(),
        "down-tok".into(),
    )
    .unwrap();

    Harness {
        registry,
        market,
        safety,
        outcomes,
        orchestrator,
        strategy_id,
        window,
    }
}

fn feed_books(market: &MarketStateHandle) {
    let symbol = Symbol::new("BTC");
    market.apply(&Tick::price(
        TickSource::Exchange,
        symbol.clone(),
        1,
        Price::new(dec!(50100)),
    ));
    market.apply(&Tick::price(
        TickSource::OraclePush,
        symbol.clone(),
        2,
        Price::new(dec!(50080)),
    ));
    for (token, bid, ask) in [
        ("up-tok", dec!(0.68), dec!(0.72)),
        ("down-tok", dec!(0.28), dec!(0.30)),
    ] {
        market.apply(&Tick::book(
            symbol.clone(),
            3,
            BookUpdate {
                token_id: token.into(),
                seq: 1,
                is_snapshot: true,
                bids: vec![BookLevel {
                    price: Price::new(bid),
                    size: Size::new(dec!(1000)),
                }],
                asks: vec![BookLevel {
                    price: Price::new(ask),
                    size: Size::new(dec!(1000)),
                }],
            },
        ));
    }
}

#[tokio::test]
async fn entry_flow_opens_position_and_logs_signal() {
    let h = harness(false).await;
    h.orchestrator
        .handle_event(WindowEvent::Open(h.window.clone()))
        .await;
    feed_books(&h.market);

    h.orchestrator.on_tick().await;

    let positions = h.orchestrator.positions().live_positions();
    assert_eq!(positions.len(), 1);
    let position = &positions[0];
    // fade_up buys the down token at its ask.
    assert_eq!(position.token_id, "down-tok");
    assert_eq!(position.entry_price.inner(), dec!(0.30));
    // 30 dollars at 0.30 = 100 contracts.
    assert_eq!(position.size.inner(), dec!(100));

    // Exposure booked.
    assert_eq!(h.safety.state().total_exposure, dec!(30.00));

    // Signal persisted before the order went out.
    let stats = h.outcomes.stats(100);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.pending, 1);
}

#[tokio::test]
async fn second_tick_does_not_double_enter() {
    let h = harness(false).await;
    h.orchestrator
        .handle_event(WindowEvent::Open(h.window.clone()))
        .await;
    feed_books(&h.market);

    h.orchestrator.on_tick().await;
    h.orchestrator.on_tick().await;

    assert_eq!(h.orchestrator.positions().live_positions().len(), 1);
    assert_eq!(h.outcomes.stats(100).total, 1);
}

#[tokio::test]
async fn tripped_safety_blocks_entry() {
    let h = harness(false).await;
    h.orchestrator
        .handle_event(WindowEvent::Open(h.window.clone()))
        .await;
    feed_books(&h.market);

    h.safety.trip(TripReason::Manual {
        message: "drill".into(),
    });
    h.orchestrator.on_tick().await;

    assert!(h.orchestrator.positions().live_positions().is_empty());
    // Signal was not persisted either: gates run before logging.
    assert_eq!(h.outcomes.stats(100).total, 0);
}

#[tokio::test]
async fn near_expiry_blocks_entry() {
    let h = harness(false).await;
    h.orchestrator
        .handle_event(WindowEvent::Open(h.window.clone()))
        .await;
    h.orchestrator
        .handle_event(WindowEvent::NearExpiry {
            window_id: h.window.window_id.clone(),
        })
        .await;
    feed_books(&h.market);

    h.orchestrator.on_tick().await;
    assert!(h.orchestrator.positions().live_positions().is_empty());
}

#[tokio::test]
async fn strategy_exit_liquidates_at_bid() {
    let h = harness(true).await;
    h.orchestrator
        .handle_event(WindowEvent::Open(h.window.clone()))
        .await;
    feed_books(&h.market);

    // First tick enters, second honors the exit.
    h.orchestrator.on_tick().await;
    assert_eq!(h.orchestrator.positions().live_positions().len(), 1);
    h.orchestrator.on_tick().await;

    assert!(h.orchestrator.positions().live_positions().is_empty());
    // Sold at the bid below entry: realized loss booked.
    let state = h.safety.state();
    assert_eq!(state.total_exposure, dec!(0));
    assert_eq!(state.realized_pnl_today, dec!(-2.00));
}

#[tokio::test]
async fn settlement_pays_binary_and_correlates_outcome() {
    let h = harness(false).await;
    h.orchestrator
        .handle_event(WindowEvent::Open(h.window.clone()))
        .await;
    feed_books(&h.market);
    h.orchestrator.on_tick().await;

    h.orchestrator
        .handle_event(WindowEvent::Close {
            window_id: h.window.window_id.clone(),
        })
        .await;
    // Final below strike: outcome down, the held down token pays 1.
    h.orchestrator
        .handle_event(WindowEvent::Settled {
            window_id: h.window.window_id.clone(),
            final_oracle_price: Some(Price::new(dec!(49900))),
        })
        .await;

    assert!(h.orchestrator.positions().live_positions().is_empty());
    let state = h.safety.state();
    // (1.0 - 0.30) * 100 contracts.
    assert_eq!(state.realized_pnl_today, dec!(70.00));
    assert_eq!(state.total_exposure, dec!(0));

    let stats = h.outcomes.stats(100);
    assert_eq!(stats.with_outcome, 1);
    assert_eq!(stats.wins, 1);

    // No re-entry into a closed window.
    h.orchestrator.on_tick().await;
    assert!(h.orchestrator.positions().live_positions().is_empty());
}

#[tokio::test]
async fn settlement_without_price_closes_flat() {
    let h = harness(false).await;
    h.orchestrator
        .handle_event(WindowEvent::Open(h.window.clone()))
        .await;
    feed_books(&h.market);
    h.orchestrator.on_tick().await;

    h.orchestrator
        .handle_event(WindowEvent::Settled {
            window_id: h.window.window_id.clone(),
            final_oracle_price: None,
        })
        .await;

    assert!(h.orchestrator.positions().live_positions().is_empty());
    assert_eq!(h.safety.state().realized_pnl_today, dec!(0));
}

#[tokio::test]
async fn inactive_strategy_not_evaluated() {
    let h = harness(false).await;
    h.registry.deactivate_strategy(h.strategy_id).await.unwrap();
    h.orchestrator
        .handle_event(WindowEvent::Open(h.window.clone()))
        .await;
    feed_books(&h.market);

    h.orchestrator.on_tick().await;
    assert!(h.orchestrator.positions().live_positions().is_empty());
}

#[tokio::test]
async fn settlement_outcome_loss_branch() {
    let h = harness(false).await;
    h.orchestrator
        .handle_event(WindowEvent::Open(h.window.clone()))
        .await;
    feed_books(&h.market);
    h.orchestrator.on_tick().await;

    // Final above strike: outcome up, held down token pays 0.
    h.orchestrator
        .handle_event(WindowEvent::Settled {
            window_id: h.window.window_id.clone(),
            final_oracle_price: Some(Price::new(dec!(50100))),
        })
        .await;

    let state = h.safety.state();
    // Lost the entry cost: -0.30 * 100.
    assert_eq!(state.realized_pnl_today, dec!(-30.00));

    let rows = h
        .outcomes
        .bucketed_stats(updown_outcome::BucketBy::Symbol, 100);
    assert_eq!(rows[0].stats.wins, 0);
    assert_eq!(rows[0].stats.with_outcome, 1);

    // Direction fade_up is correct only on a down outcome.
    assert_eq!(
        updown_core::Direction::FadeUp.winning_outcome(),
        Outcome::Down
    );
}
