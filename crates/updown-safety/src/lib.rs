//! Safety layer: exposure accounting, auto-stop, kill switch, and the
//! persisted last-known state.

pub mod auto_stop;
pub mod error;
pub mod kill;
pub mod state_file;

pub use auto_stop::{SafetyConfig, SafetyMonitor, TripReason};
pub use error::{SafetyError, SafetyResult};
pub use kill::{kill_process, read_pidfile, remove_pidfile, write_pidfile, KillOutcome, KillSwitchConfig};
pub use state_file::{LastKnownState, StateFileWriter};
