//! Entry gates.
//!
//! All gates must pass before an entry order is submitted. Checked in
//! a fixed order with early return; a block is reported with the gate
//! name for attribution.

use rust_decimal::Decimal;
use updown_core::Size;
use updown_exec::TradingMode;
use updown_telemetry::metrics;

/// A blocked entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateBlock {
    pub gate: &'static str,
    pub reason: String,
}

impl std::fmt::Display for GateBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.gate, self.reason)
    }
}

/// Everything the gate chain needs, gathered by the orchestrator.
#[derive(Debug, Clone)]
pub struct GateInputs<'a> {
    /// Near-expiry substate for this window.
    pub near_expiry: bool,
    /// Launch manifest lists the strategy.
    pub strategy_allowed: bool,
    pub strategy_name: &'a str,
    /// Auto-stop latch state.
    pub safety_tripped: bool,
    /// Exposure + proposed cost exceeds the cap.
    pub would_exceed_exposure: bool,
    pub proposed_cost: Decimal,
    /// An open position already holds the slot.
    pub slot_occupied: bool,
    /// Configured process mode vs the adapter's mode.
    pub config_mode: TradingMode,
    pub adapter_mode: TradingMode,
    /// Proposed size vs the venue minimum.
    pub size: Size,
    pub venue_min_size: Size,
}

fn block(gate: &'static str, reason: String) -> Result<(), GateBlock> {
    metrics::GATE_BLOCKED_TOTAL.with_label_values(&[gate]).inc();
    Err(GateBlock { gate, reason })
}

/// Run the gate chain. Ok(()) means the entry may proceed.
pub fn check_entry_gates(inputs: &GateInputs<'_>) -> Result<(), GateBlock> {
    // Gate a: near-expiry substate blocks new entries.
    if inputs.near_expiry {
        return block("near_expiry", "window is near expiry".into());
    }

    // Gate b: the launch manifest must list the strategy.
    if !inputs.strategy_allowed {
        return block(
            "manifest",
            format!("strategy '{}' not in launch manifest", inputs.strategy_name),
        );
    }

    // Gate c: auto-stop.
    if inputs.safety_tripped {
        return block("auto_stop", "auto-stop is tripped".into());
    }

    // Gate d: exposure cap.
    if inputs.would_exceed_exposure {
        return block(
            "exposure",
            format!(
                "proposed cost {} would exceed the exposure cap",
                inputs.proposed_cost
            ),
        );
    }

    // Gate e: one open position per (strategy, window).
    if inputs.slot_occupied {
        return block("position_slot", "slot already holds a live position".into());
    }

    // Gate f: paper/live mode must match the adapter.
    if inputs.config_mode != inputs.adapter_mode {
        return block(
            "mode",
            format!(
                "config mode {} but adapter mode {}",
                inputs.config_mode, inputs.adapter_mode
            ),
        );
    }

    // Gate g: venue minimum size.
    if inputs.size < inputs.venue_min_size {
        return block(
            "min_size",
            format!(
                "size {} below venue minimum {}",
                inputs.size, inputs.venue_min_size
            ),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn passing() -> GateInputs<'static> {
        GateInputs {
            near_expiry: false,
            strategy_allowed: true,
            strategy_name: "fade-extreme",
            safety_tripped: false,
            would_exceed_exposure: false,
            proposed_cost: dec!(30),
            slot_occupied: false,
            config_mode: TradingMode::Paper,
            adapter_mode: TradingMode::Paper,
            size: Size::new(dec!(10)),
            venue_min_size: Size::new(dec!(5)),
        }
    }

    #[test]
    fn test_all_gates_pass() {
        assert!(check_entry_gates(&passing()).is_ok());
    }

    #[test]
    fn test_near_expiry_blocks() {
        let mut inputs = passing();
        inputs.near_expiry = true;
        assert_eq!(check_entry_gates(&inputs).unwrap_err().gate, "near_expiry");
    }

    #[test]
    fn test_manifest_blocks() {
        let mut inputs = passing();
        inputs.strategy_allowed = false;
        assert_eq!(check_entry_gates(&inputs).unwrap_err().gate, "manifest");
    }

    #[test]
    fn test_tripped_blocks() {
        let mut inputs = passing();
        inputs.safety_tripped = true;
        assert_eq!(check_entry_gates(&inputs).unwrap_err().gate, "auto_stop");
    }

    #[test]
    fn test_exposure_blocks() {
        let mut inputs = passing();
        inputs.would_exceed_exposure = true;
        assert_eq!(check_entry_gates(&inputs).unwrap_err().gate, "exposure");
    }

    #[test]
    fn test_slot_blocks() {
        let mut inputs = passing();
        inputs.slot_occupied = true;
        assert_eq!(check_entry_gates(&inputs).unwrap_err().gate, "position_slot");
    }

    #[test]
    fn test_mode_mismatch_blocks() {
        let mut inputs = passing();
        inputs.adapter_mode = TradingMode::Live;
        assert_eq!(check_entry_gates(&inputs).unwrap_err().gate, "mode");
    }

    #[test]
    fn test_min_size_blocks() {
        let mut inputs = passing();
        inputs.size = Size::new(dec!(1));
        assert_eq!(check_entry_gates(&inputs).unwrap_err().gate, "min_size");
    }

    #[test]
    fn test_gate_order_near_expiry_first() {
        // Every gate failing: the first in the chain is reported.
        let inputs = GateInputs {
            near_expiry: true,
            strategy_allowed: false,
            strategy_name: "x",
            safety_tripped: true,
            would_exceed_exposure: true,
            proposed_cost: dec!(1000),
            slot_occupied: true,
            config_mode: TradingMode::Paper,
            adapter_mode: TradingMode::Live,
            size: Size::ZERO,
            venue_min_size: Size::ONE,
        };
        assert_eq!(check_entry_gates(&inputs).unwrap_err().gate, "near_expiry");
    }
}
