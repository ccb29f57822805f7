//! Execution adapter: normalized order placement and cancellation.
//!
//! The [`ExecutionClient`] trait is the single seam between the
//! orchestrator and any venue. Paper mode is a full simulator that
//! mirrors live fill semantics deterministically; live mode speaks the
//! venue CLOB REST API. Credentials are validated once at init by a
//! balance round-trip.

pub mod client;
pub mod error;
pub mod live;
pub mod order;
pub mod paper;

pub use client::{validate_credentials, ExecutionClient, PriceView, TradingMode};
pub use error::{ExecError, ExecResult};
pub use live::{Credentials, LiveExecutor, LiveExecutorConfig};
pub use order::{OrderRequest, OrderStatus, PlacedOrder};
pub use paper::{PaperExecutor, SlippageModel};
