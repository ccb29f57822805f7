//! The persisted last-known state.
//!
//! A JSON snapshot of everything a post-mortem needs: open positions,
//! in-flight orders, last ticks, and the auto-stop state. Refreshed
//! on a cadence and on every material change. Writes are atomic
//! (write-temp, rename) so a crash mid-write never corrupts the file.

use crate::error::{SafetyError, SafetyResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use updown_core::{AutoStopState, Position, Price};

/// An in-flight order summary for the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflightSummary {
    pub strategy_id: String,
    pub window_id: String,
    pub order_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// The snapshot written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastKnownState {
    pub open_positions: Vec<Position>,
    pub inflight_orders: Vec<InflightSummary>,
    /// symbol -> source -> last price.
    pub last_ticks: HashMap<String, HashMap<String, Price>>,
    pub auto_stop_state: AutoStopState,
    pub written_at: DateTime<Utc>,
}

/// Atomic writer for the last-known-state file.
pub struct StateFileWriter {
    path: PathBuf,
}

impl StateFileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot: temp file in the same directory, then
    /// rename over the target.
    pub fn write(&self, state: &LastKnownState) -> SafetyResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Last-known state written");
        Ok(())
    }

    /// Load a previously written snapshot.
    pub fn load(&self) -> SafetyResult<LastKnownState> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            SafetyError::StateFile(format!("cannot read {}: {e}", self.path.display()))
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use updown_core::{OrderSide, Size};
    use uuid::Uuid;

    fn sample_state() -> LastKnownState {
        let position = Position::open(
            Uuid::new_v4(),
            "BTC-updown-15m-900".into(),
            "down-tok".into(),
            OrderSide::Buy,
            Size::new(dec!(10)),
            Price::new(dec!(0.30)),
        );
        let mut last_ticks = HashMap::new();
        last_ticks.insert(
            "BTC".to_string(),
            HashMap::from([("exchange".to_string(), Price::new(dec!(50000)))]),
        );
        LastKnownState {
            open_positions: vec![position],
            inflight_orders: vec![],
            last_ticks,
            auto_stop_state: AutoStopState::default(),
            written_at: Utc::now(),
        }
    }

    #[test]
    fn test_write_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StateFileWriter::new(dir.path().join("last_known_state.json"));

        let state = sample_state();
        writer.write(&state).unwrap();
        let loaded = writer.load().unwrap();

        assert_eq!(loaded.open_positions.len(), 1);
        assert_eq!(loaded.open_positions[0].window_id, "BTC-updown-15m-900");
        assert_eq!(
            loaded.last_ticks["BTC"]["exchange"],
            Price::new(dec!(50000))
        );
    }

    #[test]
    fn test_rewrite_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StateFileWriter::new(dir.path().join("state.json"));
        writer.write(&sample_state()).unwrap();
        writer.write(&sample_state()).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("state.json")]);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let writer = StateFileWriter::new("/nonexistent/state.json");
        assert!(matches!(writer.load(), Err(SafetyError::StateFile(_))));
    }
}
