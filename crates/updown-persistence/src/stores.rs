//! Store trait implementations over the gateway.
//!
//! Each owning subsystem defines its own store seam; this module
//! binds them all to Postgres. Every write goes through the retry
//! envelope; auto-stop writes use the breaker pool because they must
//! not pile up behind a sick primary path.

use crate::gateway::PgGateway;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use std::sync::Arc;
use updown_core::{
    AutoStopState, ComponentSlots, OrderSide, Position, PositionStatus, Signal, SignalInputs,
    SignalOutcome, StrategyInstance, Symbol, Window,
};
use updown_orchestrator::{OrchError, OrchResult, PositionStore};
use updown_outcome::{OutcomeError, OutcomeResult, OutcomeStore};
use updown_registry::{RegistryError, RegistryResult, StrategyStore};

fn side_to_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn side_from_str(s: &str) -> OrderSide {
    match s {
        "sell" => OrderSide::Sell,
        _ => OrderSide::Buy,
    }
}

fn status_to_str(status: PositionStatus) -> &'static str {
    match status {
        PositionStatus::Open => "open",
        PositionStatus::Closing => "closing",
        PositionStatus::Closed => "closed",
    }
}

fn status_from_str(s: &str) -> PositionStatus {
    match s {
        "closing" => PositionStatus::Closing,
        "closed" => PositionStatus::Closed,
        _ => PositionStatus::Open,
    }
}

// ============================================================================
// StrategyStore
// ============================================================================

#[async_trait]
impl StrategyStore for PgGateway {
    async fn upsert(&self, instance: &StrategyInstance) -> RegistryResult<()> {
        self.with_retry("strategies.upsert", || {
            let pool = self.main().clone();
            let instance = instance.clone();
            async move {
                sqlx::query(
                    "INSERT INTO strategies
                        (id, name, base_strategy_id, probability_component,
                         entry_component, sizing_component, exit_component,
                         config, created_at, active)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                     ON CONFLICT (id) DO UPDATE SET
                        probability_component = EXCLUDED.probability_component,
                        entry_component = EXCLUDED.entry_component,
                        sizing_component = EXCLUDED.sizing_component,
                        exit_component = EXCLUDED.exit_component,
                        config = EXCLUDED.config,
                        active = EXCLUDED.active",
                )
                .bind(instance.id)
                .bind(&instance.name)
                .bind(instance.base_strategy_id)
                .bind(&instance.components.probability)
                .bind(&instance.components.entry)
                .bind(&instance.components.sizing)
                .bind(&instance.components.exit)
                .bind(&instance.config)
                .bind(instance.created_at)
                .bind(instance.active)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
        .map_err(|e| RegistryError::new(e.code(), e.to_string()))
    }

    async fn load_all(&self) -> RegistryResult<Vec<StrategyInstance>> {
        let rows = self
            .with_retry("strategies.load_all", || {
                let pool = self.main().clone();
                async move {
                    sqlx::query(
                        "SELECT id, name, base_strategy_id, probability_component,
                                entry_component, sizing_component, exit_component,
                                config, created_at, active
                         FROM strategies",
                    )
                    .fetch_all(&pool)
                    .await
                }
            })
            .await
            .map_err(|e| RegistryError::new(e.code(), e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(StrategyInstance {
                    id: get(row, "id")?,
                    name: get(row, "name")?,
                    base_strategy_id: get(row, "base_strategy_id")?,
                    components: ComponentSlots {
                        probability: get(row, "probability_component")?,
                        entry: get(row, "entry_component")?,
                        sizing: get(row, "sizing_component")?,
                        exit: get(row, "exit_component")?,
                    },
                    config: get(row, "config")?,
                    created_at: get(row, "created_at")?,
                    active: get(row, "active")?,
                })
            })
            .collect()
    }
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> RegistryResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column).map_err(|e| {
        let wrapped = StoreError::from_sqlx(e);
        RegistryError::new(wrapped.code(), wrapped.to_string())
    })
}

// ============================================================================
// PositionStore
// ============================================================================

#[async_trait]
impl PositionStore for PgGateway {
    async fn upsert_position(&self, position: &Position) -> OrchResult<()> {
        self.with_retry("positions.upsert", || {
            let pool = self.main().clone();
            let p = position.clone();
            async move {
                sqlx::query(
                    "INSERT INTO positions
                        (id, strategy_id, window_id, token_id, side, size,
                         entry_price, entry_time, status, exit_price, exit_reason)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                     ON CONFLICT (id) DO UPDATE SET
                        status = EXCLUDED.status,
                        exit_price = EXCLUDED.exit_price,
                        exit_reason = EXCLUDED.exit_reason",
                )
                .bind(p.id)
                .bind(p.strategy_id)
                .bind(&p.window_id)
                .bind(&p.token_id)
                .bind(side_to_str(p.side))
                .bind(p.size.inner())
                .bind(p.entry_price.inner())
                .bind(p.entry_time)
                .bind(status_to_str(p.status))
                .bind(p.exit_price.map(|x| x.inner()))
                .bind(&p.exit_reason)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
        .map_err(|e| OrchError::Store(e.to_string()))
    }

    async fn load_live_positions(&self) -> OrchResult<Vec<Position>> {
        let rows = self
            .with_retry("positions.load_live", || {
                let pool = self.main().clone();
                async move {
                    sqlx::query(
                        "SELECT id, strategy_id, window_id, token_id, side, size,
                                entry_price, entry_time, status, exit_price, exit_reason
                         FROM positions
                         WHERE status IN ('open', 'closing')",
                    )
                    .fetch_all(&pool)
                    .await
                }
            })
            .await
            .map_err(|e| OrchError::Store(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let side: String = pget(row, "side")?;
                let status: String = pget(row, "status")?;
                let size: Decimal = pget(row, "size")?;
                let entry_price: Decimal = pget(row, "entry_price")?;
                let exit_price: Option<Decimal> = pget(row, "exit_price")?;
                Ok(Position {
                    id: pget(row, "id")?,
                    strategy_id: pget(row, "strategy_id")?,
                    window_id: pget(row, "window_id")?,
                    token_id: pget(row, "token_id")?,
                    side: side_from_str(&side),
                    size: size.into(),
                    entry_price: entry_price.into(),
                    entry_time: pget(row, "entry_time")?,
                    status: status_from_str(&status),
                    exit_price: exit_price.map(Into::into),
                    exit_reason: pget(row, "exit_reason")?,
                })
            })
            .collect()
    }
}

fn pget<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> OrchResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| OrchError::Store(StoreError::from_sqlx(e).to_string()))
}

// ============================================================================
// OutcomeStore
// ============================================================================

#[async_trait]
impl OutcomeStore for PgGateway {
    async fn insert_signal(&self, signal: &Signal) -> OutcomeResult<()> {
        self.with_retry("signals.insert", || {
            let pool = self.main().clone();
            let s = signal.clone();
            async move {
                let inputs =
                    serde_json::to_value(&s.inputs).unwrap_or(serde_json::Value::Null);
                sqlx::query(
                    "INSERT INTO signals
                        (window_id, strategy_id, symbol, direction, confidence,
                         token_id, side, size, inputs, generated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                     ON CONFLICT (window_id, strategy_id) DO NOTHING",
                )
                .bind(&s.window_id)
                .bind(s.strategy_id)
                .bind(s.symbol.as_str())
                .bind(s.direction.to_string())
                .bind(s.confidence)
                .bind(&s.token_id)
                .bind(side_to_str(s.side))
                .bind(s.size.inner())
                .bind(inputs)
                .bind(s.generated_at)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
        .map_err(|e| OutcomeError::Store(e.to_string()))
    }

    async fn update_outcome(&self, outcome: &SignalOutcome) -> OutcomeResult<()> {
        self.with_retry("signal_outcomes.upsert", || {
            let pool = self.main().clone();
            let o = outcome.clone();
            async move {
                sqlx::query(
                    "INSERT INTO signal_outcomes
                        (window_id, strategy_id, final_oracle_price,
                         settlement_outcome, signal_correct, exit_price, pnl, settled_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     ON CONFLICT (window_id, strategy_id) DO UPDATE SET
                        final_oracle_price = EXCLUDED.final_oracle_price,
                        settlement_outcome = EXCLUDED.settlement_outcome,
                        signal_correct = EXCLUDED.signal_correct,
                        exit_price = EXCLUDED.exit_price,
                        pnl = EXCLUDED.pnl,
                        settled_at = EXCLUDED.settled_at",
                )
                .bind(&o.signal.window_id)
                .bind(o.signal.strategy_id)
                .bind(o.final_oracle_price.inner())
                .bind(o.settlement_outcome.to_string())
                .bind(o.signal_correct)
                .bind(o.exit_price.map(|x| x.inner()))
                .bind(o.pnl)
                .bind(o.settled_at)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
        .map_err(|e| OutcomeError::Store(e.to_string()))
    }

    async fn load_pending(&self) -> OutcomeResult<Vec<Signal>> {
        let rows = self
            .with_retry("signals.load_pending", || {
                let pool = self.main().clone();
                async move {
                    sqlx::query(
                        "SELECT s.window_id, s.strategy_id, s.symbol, s.direction,
                                s.confidence, s.token_id, s.side, s.size, s.inputs,
                                s.generated_at
                         FROM signals s
                         LEFT JOIN signal_outcomes o
                           ON o.window_id = s.window_id
                          AND o.strategy_id = s.strategy_id
                         WHERE o.window_id IS NULL",
                    )
                    .fetch_all(&pool)
                    .await
                }
            })
            .await
            .map_err(|e| OutcomeError::Store(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let direction: String = oget(row, "direction")?;
                let side: String = oget(row, "side")?;
                let symbol: String = oget(row, "symbol")?;
                let size: Decimal = oget(row, "size")?;
                let inputs_json: serde_json::Value = oget(row, "inputs")?;
                let inputs: SignalInputs = serde_json::from_value(inputs_json)
                    .map_err(|e| OutcomeError::Store(format!("bad signal inputs: {e}")))?;
                Ok(Signal {
                    strategy_id: oget(row, "strategy_id")?,
                    window_id: oget(row, "window_id")?,
                    symbol: Symbol::new(symbol),
                    direction: if direction == "fade_down" {
                        updown_core::Direction::FadeDown
                    } else {
                        updown_core::Direction::FadeUp
                    },
                    confidence: oget(row, "confidence")?,
                    token_id: oget(row, "token_id")?,
                    side: side_from_str(&side),
                    size: size.into(),
                    inputs,
                    generated_at: oget(row, "generated_at")?,
                })
            })
            .collect()
    }
}

fn oget<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> OutcomeResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| OutcomeError::Store(StoreError::from_sqlx(e).to_string()))
}

// ============================================================================
// Windows and auto-stop (inherent methods)
// ============================================================================

impl PgGateway {
    /// Record a discovered window. Idempotent on window id.
    pub async fn upsert_window(&self, window: &Window) -> Result<(), StoreError> {
        self.with_retry("windows.upsert", || {
            let pool = self.main().clone();
            let w = window.clone();
            async move {
                sqlx::query(
                    "INSERT INTO windows
                        (window_id, symbol, open_epoch, close_epoch,
                         strike_price, up_token_id, down_token_id)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)
                     ON CONFLICT (window_id) DO NOTHING",
                )
                .bind(&w.window_id)
                .bind(w.symbol.as_str())
                .bind(w.open_epoch)
                .bind(w.close_epoch)
                .bind(w.strike_price.inner())
                .bind(&w.up_token_id)
                .bind(&w.down_token_id)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    /// Persist the auto-stop state through the breaker pool: written
    /// on a cadence and on every transition, and must fail fast when
    /// the database is sick.
    pub async fn save_auto_stop(&self, state: &AutoStopState) -> Result<(), StoreError> {
        let s = state.clone();
        self.with_breaker("auto_stop.save", move |pool| {
            let s = s.clone();
            async move {
                sqlx::query(
                    "INSERT INTO auto_stop_state
                        (singleton, total_exposure, realized_pnl_today, unrealized_pnl,
                         drawdown_from_hwm, tripped, tripped_reason, updated_at)
                     VALUES (TRUE, $1, $2, $3, $4, $5, $6, $7)
                     ON CONFLICT (singleton) DO UPDATE SET
                        total_exposure = EXCLUDED.total_exposure,
                        realized_pnl_today = EXCLUDED.realized_pnl_today,
                        unrealized_pnl = EXCLUDED.unrealized_pnl,
                        drawdown_from_hwm = EXCLUDED.drawdown_from_hwm,
                        tripped = EXCLUDED.tripped,
                        tripped_reason = EXCLUDED.tripped_reason,
                        updated_at = EXCLUDED.updated_at",
                )
                .bind(s.total_exposure)
                .bind(s.realized_pnl_today)
                .bind(s.unrealized_pnl)
                .bind(s.drawdown_from_hwm)
                .bind(s.tripped)
                .bind(&s.tripped_reason)
                .bind(s.updated_at)
                .execute(&pool)
                .await
                .map(|_| ())
            }
        })
        .await
    }

    /// Last persisted auto-stop state, if any.
    pub async fn load_auto_stop(&self) -> Result<Option<AutoStopState>, StoreError> {
        let row = sqlx::query(
            "SELECT total_exposure, realized_pnl_today, unrealized_pnl,
                    drawdown_from_hwm, tripped, tripped_reason, updated_at
             FROM auto_stop_state WHERE singleton = TRUE",
        )
        .fetch_optional(self.main())
        .await
        .map_err(StoreError::from_sqlx)?;

        row.map(|row| -> Result<AutoStopState, StoreError> {
            Ok(AutoStopState {
                total_exposure: row.try_get("total_exposure").map_err(StoreError::from_sqlx)?,
                realized_pnl_today: row
                    .try_get("realized_pnl_today")
                    .map_err(StoreError::from_sqlx)?,
                unrealized_pnl: row.try_get("unrealized_pnl").map_err(StoreError::from_sqlx)?,
                drawdown_from_hwm: row
                    .try_get("drawdown_from_hwm")
                    .map_err(StoreError::from_sqlx)?,
                tripped: row.try_get("tripped").map_err(StoreError::from_sqlx)?,
                tripped_reason: row.try_get("tripped_reason").map_err(StoreError::from_sqlx)?,
                updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(StoreError::from_sqlx)?,
            })
        })
        .transpose()
    }
}
