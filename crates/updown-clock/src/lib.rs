//! Window clock: drives 15-minute windows through their lifecycle.
//!
//! Divides wall-clock time into windows aligned to the epoch grid,
//! discovers the active contract for each window, and emits ordered
//! lifecycle events. The clock never jumps past states: when the
//! process sleeps across a boundary every intermediate transition is
//! emitted, in order.

pub mod clock;
pub mod error;
pub mod resolver;

pub use clock::{WindowClock, WindowClockConfig, WindowEvent, WindowPhase};
pub use error::{ClockError, ClockResult};
pub use resolver::{ContractMeta, ContractResolver, SettlementSource};
