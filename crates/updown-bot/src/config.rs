//! Process tunables, loaded from a TOML file.
//!
//! Everything the environment does not own: feed endpoints, cadences,
//! timeouts, safety thresholds, file paths. Defaults are usable for
//! paper trading out of the box.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Feed endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_exchange_ws_url")]
    pub exchange_ws_url: String,
    #[serde(default = "default_oracle_push_url")]
    pub oracle_push_url: String,
    #[serde(default = "default_oracle_sse_url")]
    pub oracle_sse_url: String,
    #[serde(default = "default_clob_ws_url")]
    pub clob_ws_url: String,
    /// Subscriber reconnect backoff floor.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Subscriber reconnect backoff ceiling.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Tick queue capacity before tail-drop.
    #[serde(default = "default_tick_queue_capacity")]
    pub tick_queue_capacity: usize,
}

fn default_exchange_ws_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_oracle_push_url() -> String {
    "wss://ws.chainlink-oracle.example/prices".to_string()
}

fn default_oracle_sse_url() -> String {
    "https://sse.chainlink-oracle.example/prices".to_string()
}

fn default_clob_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_reconnect_base_delay_ms() -> u64 {
    500
}

fn default_reconnect_max_delay_ms() -> u64 {
    5_000
}

fn default_tick_queue_capacity() -> usize {
    4_096
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            exchange_ws_url: default_exchange_ws_url(),
            oracle_push_url: default_oracle_push_url(),
            oracle_sse_url: default_oracle_sse_url(),
            clob_ws_url: default_clob_ws_url(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            tick_queue_capacity: default_tick_queue_capacity(),
        }
    }
}

/// Timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Near-expiry margin before window close.
    #[serde(default = "default_min_time_remaining_ms")]
    pub min_time_remaining_ms: i64,
    #[serde(default = "default_inflight_timeout_ms")]
    pub inflight_timeout_ms: u64,
    #[serde(default = "default_settlement_grace_ms")]
    pub settlement_grace_ms: i64,
    #[serde(default = "default_graceful_timeout_ms")]
    pub graceful_timeout_ms: u64,
    #[serde(default = "default_module_init_timeout_ms")]
    pub module_init_timeout_ms: u64,
    /// Last-known-state refresh cadence.
    #[serde(default = "default_state_update_interval_ms")]
    pub state_update_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_min_time_remaining_ms() -> i64 {
    60_000
}

fn default_inflight_timeout_ms() -> u64 {
    10_000
}

fn default_settlement_grace_ms() -> i64 {
    30_000
}

fn default_graceful_timeout_ms() -> u64 {
    10_000
}

fn default_module_init_timeout_ms() -> u64 {
    10_000
}

fn default_state_update_interval_ms() -> u64 {
    5_000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            min_time_remaining_ms: default_min_time_remaining_ms(),
            inflight_timeout_ms: default_inflight_timeout_ms(),
            settlement_grace_ms: default_settlement_grace_ms(),
            graceful_timeout_ms: default_graceful_timeout_ms(),
            module_init_timeout_ms: default_module_init_timeout_ms(),
            state_update_interval_ms: default_state_update_interval_ms(),
        }
    }
}

/// Safety thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyLimitsConfig {
    #[serde(default = "default_max_daily_loss_dollars")]
    pub max_daily_loss_dollars: f64,
    #[serde(default = "default_max_drawdown_dollars")]
    pub max_drawdown_dollars: f64,
    #[serde(default = "default_safety_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

fn default_max_daily_loss_dollars() -> f64 {
    100.0
}

fn default_max_drawdown_dollars() -> f64 {
    150.0
}

fn default_safety_refresh_interval_ms() -> u64 {
    5_000
}

impl Default for SafetyLimitsConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_dollars: default_max_daily_loss_dollars(),
            max_drawdown_dollars: default_max_drawdown_dollars(),
            refresh_interval_ms: default_safety_refresh_interval_ms(),
        }
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feeds: FeedConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub safety: SafetyLimitsConfig,
    /// Taker slippage applied by the paper simulator (fraction).
    #[serde(default = "default_paper_slippage")]
    pub paper_slippage: f64,
    /// Venue minimum order size in contracts.
    #[serde(default = "default_venue_min_size")]
    pub venue_min_size: f64,
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
    #[serde(default = "default_pidfile_path")]
    pub pidfile_path: String,
    #[serde(default = "default_state_file_path")]
    pub state_file_path: String,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: String,
}

fn default_paper_slippage() -> f64 {
    0.002
}

fn default_venue_min_size() -> f64 {
    5.0
}

fn default_manifest_path() -> String {
    "launch.json".to_string()
}

fn default_pidfile_path() -> String {
    "updown-bot.pid".to_string()
}

fn default_state_file_path() -> String {
    "last_known_state.json".to_string()
}

fn default_migrations_dir() -> String {
    "migrations".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feeds: FeedConfig::default(),
            timing: TimingConfig::default(),
            safety: SafetyLimitsConfig::default(),
            paper_slippage: default_paper_slippage(),
            venue_min_size: default_venue_min_size(),
            manifest_path: default_manifest_path(),
            pidfile_path: default_pidfile_path(),
            state_file_path: default_state_file_path(),
            migrations_dir: default_migrations_dir(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, falling back to defaults when the file
    /// does not exist.
    pub fn load(config_path: &str) -> AppResult<Self> {
        if std::path::Path::new(config_path).exists() {
            Self::from_file(config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }
}
