//! Prometheus metrics.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally: a registration
//! failure means duplicate metric names, which should crash at startup
//! rather than fail silently. These panics only occur during static
//! initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter_vec,
    CounterVec, Gauge, GaugeVec, IntCounterVec,
};

/// Ticks received per source.
pub static TICKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "updown_ticks_total",
        "Ticks received per source",
        &["source", "symbol"]
    )
    .unwrap()
});

/// Ticks dropped on channel overflow, per source.
pub static TICKS_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "updown_ticks_dropped_total",
        "Ticks dropped on bounded-channel overflow",
        &["source"]
    )
    .unwrap()
});

/// Feed connection state per source (1 = up).
pub static FEED_UP: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "updown_feed_up",
        "Feed connection state (1=connected)",
        &["source"]
    )
    .unwrap()
});

/// Signals emitted per strategy.
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_signals_total",
        "Signals emitted",
        &["strategy", "direction"]
    )
    .unwrap()
});

/// Entry-gate blocks by gate name.
pub static GATE_BLOCKED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "updown_gate_blocked_total",
        "Entry gate blocks",
        &["gate"]
    )
    .unwrap()
});

/// Orders submitted / rejected / timed out.
pub static ORDERS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "updown_orders_total",
        "Order submissions by result",
        &["result"]
    )
    .unwrap()
});

/// Current total exposure in dollars.
pub static EXPOSURE_DOLLARS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("updown_exposure_dollars", "Current total exposure").unwrap()
});

/// Auto-stop trip state (1 = tripped).
pub static AUTO_STOP_TRIPPED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("updown_auto_stop_tripped", "Auto-stop trip state").unwrap()
});

/// Windows settled.
pub static WINDOWS_SETTLED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "updown_windows_settled_total",
        "Windows settled by outcome",
        &["symbol", "outcome"]
    )
    .unwrap()
});
