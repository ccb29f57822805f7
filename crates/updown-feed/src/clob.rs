//! CLOB order-book subscriber.
//!
//! Subscribes to the venue's market channel for the current window's
//! token ids and normalizes book snapshots (`event_type: "book"`) and
//! deltas (`event_type: "price_change"`) into `Tick`s carrying
//! `BookUpdate`s. The venue timestamp is used as the sequence number;
//! out-of-order updates are rejected downstream by the market state
//! store.

use crate::error::{FeedError, FeedResult};
use crate::mono_ns;
use crate::tick_queue::TickQueue;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use updown_core::{BookLevel, BookUpdate, Price, Size, Symbol, Tick, TickSource};
use updown_telemetry::metrics;
use updown_ws::{ConnectionConfig, WsClient};

/// Maps CLOB token ids to their symbol. The window clock inserts the
/// current window's tokens as each window is discovered.
pub type TokenMap = Arc<RwLock<HashMap<String, Symbol>>>;

/// CLOB feed configuration.
#[derive(Debug, Clone)]
pub struct ClobFeedConfig {
    /// Market-channel WebSocket URL.
    pub url: String,
    /// Token ids to subscribe to at connect time.
    pub initial_tokens: Vec<String>,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

fn parse_levels(value: Option<&Value>) -> Vec<BookLevel> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let price: Price = item.get("price")?.as_str()?.parse().ok()?;
            let size: Size = item.get("size")?.as_str()?.parse().ok()?;
            Some(BookLevel { price, size })
        })
        .collect()
}

fn parse_seq(value: &Value) -> u64 {
    match value.get("timestamp") {
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

/// Parse one market-channel event into a `BookUpdate`.
///
/// Returns Ok(None) for event types we do not consume (trades,
/// tick-size changes).
pub fn parse_book_event(event: &Value) -> FeedResult<Option<BookUpdate>> {
    let event_type = event.get("event_type").and_then(Value::as_str);
    let Some(event_type) = event_type else {
        return Ok(None);
    };

    let token_id = event
        .get("asset_id")
        .and_then(Value::as_str)
        .ok_or_else(|| FeedError::Parse(format!("{event_type} event missing asset_id")))?
        .to_string();
    let seq = parse_seq(event);

    match event_type {
        "book" => Ok(Some(BookUpdate {
            token_id,
            seq,
            is_snapshot: true,
            bids: parse_levels(event.get("bids")),
            asks: parse_levels(event.get("asks")),
        })),
        "price_change" => {
            let mut bids = Vec::new();
            let mut asks = Vec::new();
            if let Some(Value::Array(changes)) = event.get("changes") {
                for change in changes {
                    let Some(price) = change
                        .get("price")
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse().ok())
                    else {
                        continue;
                    };
                    let Some(size) = change
                        .get("size")
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse().ok())
                    else {
                        continue;
                    };
                    let level = BookLevel { price, size };
                    match change.get("side").and_then(Value::as_str) {
                        Some("BUY") => bids.push(level),
                        Some("SELL") => asks.push(level),
                        other => warn!(?other, "Unknown price_change side"),
                    }
                }
            }
            Ok(Some(BookUpdate {
                token_id,
                seq,
                is_snapshot: false,
                bids,
                asks,
            }))
        }
        _ => Ok(None),
    }
}

/// Parse a full frame, which may be a single event or an array.
pub fn parse_book_frame(frame: &str) -> FeedResult<Vec<BookUpdate>> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| FeedError::Parse(e.to_string()))?;
    let events: Vec<&Value> = match &value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut updates = Vec::new();
    for event in events {
        if let Some(update) = parse_book_event(event)? {
            updates.push(update);
        }
    }
    Ok(updates)
}

/// Spawn the CLOB book subscriber task.
pub fn spawn_clob_book_feed(
    config: ClobFeedConfig,
    tokens: TokenMap,
    queue: TickQueue,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let conn_config = ConnectionConfig {
            url: config.url.clone(),
            subscribe_payloads: vec![serde_json::json!({
                "type": "market",
                "assets_ids": config.initial_tokens,
            })],
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: config.reconnect_base_delay_ms,
            reconnect_max_delay_ms: config.reconnect_max_delay_ms,
        };

        let (frame_tx, mut frame_rx) = mpsc::channel::<String>(1024);
        let client = WsClient::new(conn_config, frame_tx);
        let client_shutdown = shutdown.clone();
        let conn = tokio::spawn(async move {
            if let Err(e) = client.run(client_shutdown).await {
                warn!(?e, "CLOB book connection loop ended");
            }
        });

        info!(url = %config.url, "CLOB book feed starting");
        metrics::FEED_UP
            .with_label_values(&[TickSource::ClobBook.as_str()])
            .set(1.0);

        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break };
                    match parse_book_frame(&frame) {
                        Ok(updates) => {
                            for update in updates {
                                let Some(symbol) = tokens.read().get(&update.token_id).cloned()
                                else {
                                    // Token from a window we no longer track.
                                    continue;
                                };
                                queue.push(Tick::book(symbol, mono_ns(), update));
                            }
                        }
                        Err(e) => warn!(?e, "Unparseable book frame"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        metrics::FEED_UP
            .with_label_values(&[TickSource::ClobBook.as_str()])
            .set(0.0);
        let _ = conn.await;
        info!("CLOB book feed stopped");
    })
}
