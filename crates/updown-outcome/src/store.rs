//! Durable backing for signals and outcomes.

use crate::error::OutcomeResult;
use async_trait::async_trait;
use updown_core::{Signal, SignalOutcome};

/// Write-through store; the logger's in-memory table remains the
/// query authority for the process lifetime.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn insert_signal(&self, signal: &Signal) -> OutcomeResult<()>;
    async fn update_outcome(&self, outcome: &SignalOutcome) -> OutcomeResult<()>;
    async fn load_pending(&self) -> OutcomeResult<Vec<Signal>>;
}
