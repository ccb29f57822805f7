//! Orchestrator error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchError {
    #[error("Position slot occupied for strategy {strategy_id} window {window_id}")]
    SlotOccupied {
        strategy_id: uuid::Uuid,
        window_id: String,
    },

    #[error("Position not found for strategy {strategy_id} window {window_id}")]
    PositionNotFound {
        strategy_id: uuid::Uuid,
        window_id: String,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Execution error: {0}")]
    Exec(#[from] updown_exec::ExecError),

    #[error("Registry error: {0}")]
    Registry(#[from] updown_registry::RegistryError),

    #[error("Outcome error: {0}")]
    Outcome(#[from] updown_outcome::OutcomeError),
}

pub type OrchResult<T> = Result<T, OrchError>;
