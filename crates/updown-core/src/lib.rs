//! Core domain types for the 15-minute up/down trading engine.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Size`: precision-safe numeric types
//! - `Window`: a 15-minute contract window aligned to the epoch grid
//! - `Tick`, `MarketSnapshot`: normalized market data
//! - `Signal`, `SignalOutcome`, `Position`: trading records
//! - `StrategyInstance`, `ComponentType`: strategy composition records

pub mod decimal;
pub mod error;
pub mod position;
pub mod safety;
pub mod signal;
pub mod snapshot;
pub mod strategy;
pub mod symbol;
pub mod tick;
pub mod window;

pub use decimal::{Price, Size};
pub use error::{CoreError, ErrorCode, Result};
pub use position::{Position, PositionStatus};
pub use safety::AutoStopState;
pub use signal::{binary_pnl, Direction, Outcome, Signal, SignalInputs, SignalOutcome};
pub use snapshot::{BookTop, MarketSnapshot, SourceQuote};
pub use strategy::{ComponentSlots, ComponentType, StrategyInstance};
pub use symbol::Symbol;
pub use tick::{BookLevel, BookUpdate, OrderSide, Tick, TickPayload, TickSource};
pub use window::{open_epoch_for, Window, WINDOW_SECS};
