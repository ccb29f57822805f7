//! Backtest harness.
//!
//! Replays recorded windows through the strategy registry with
//! simulated market context and binary-settlement fills. The contract
//! with the registry is the public `execute_strategy` surface; no
//! live collaborator is involved.

pub mod replay;

pub use replay::{ReplayDriver, ReplayReport, ReplayWindow, StrategySummary};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("Replay input invalid: {0}")]
    InvalidInput(String),

    #[error("Registry error: {0}")]
    Registry(#[from] updown_registry::RegistryError),
}

pub type BacktestResult<T> = Result<T, BacktestError>;
