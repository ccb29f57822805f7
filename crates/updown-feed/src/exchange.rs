//! Exchange spot-price subscriber.
//!
//! Subscribes to the exchange's mini-ticker stream over WebSocket and
//! normalizes close prices into `Tick`s tagged `TickSource::Exchange`.

use crate::error::{FeedError, FeedResult};
use crate::tick_queue::TickQueue;
use crate::mono_ns;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use updown_core::{Price, Symbol, Tick, TickSource};
use updown_telemetry::metrics;
use updown_ws::{ConnectionConfig, WsClient};

/// Exchange feed configuration.
#[derive(Debug, Clone)]
pub struct ExchangeFeedConfig {
    /// Combined-stream WebSocket URL.
    pub url: String,
    pub symbols: Vec<Symbol>,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl ExchangeFeedConfig {
    fn connection(&self) -> ConnectionConfig {
        let params: Vec<String> = self
            .symbols
            .iter()
            .map(|s| format!("{}@miniTicker", s.exchange_pair().to_lowercase()))
            .collect();
        ConnectionConfig {
            url: self.url.clone(),
            subscribe_payloads: vec![serde_json::json!({
                "method": "SUBSCRIBE",
                "params": params,
                "id": 1
            })],
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: self.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.reconnect_max_delay_ms,
        }
    }
}

/// Parse a mini-ticker frame into (symbol, close price).
///
/// Accepts both combined-stream (`{"stream":..,"data":{..}}`) and
/// single-stream shapes. Returns Ok(None) for frames that are not
/// tickers (subscription acks and the like).
pub fn parse_ticker_frame(frame: &str) -> FeedResult<Option<(Symbol, Price)>> {
    let value: Value =
        serde_json::from_str(frame).map_err(|e| FeedError::Parse(e.to_string()))?;
    let data = value.get("data").unwrap_or(&value);

    let pair = match data.get("s").and_then(Value::as_str) {
        Some(p) => p,
        None => return Ok(None),
    };
    let close = data
        .get("c")
        .and_then(Value::as_str)
        .ok_or_else(|| FeedError::Parse(format!("ticker for {pair} missing close")))?;

    let symbol = Symbol::new(pair.trim_end_matches("USDT"));
    let price: Price = close
        .parse()
        .map_err(|e| FeedError::Parse(format!("bad close price {close}: {e}")))?;
    Ok(Some((symbol, price)))
}

/// Spawn the exchange subscriber task.
pub fn spawn_exchange_feed(
    config: ExchangeFeedConfig,
    queue: TickQueue,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (frame_tx, mut frame_rx) = mpsc::channel::<String>(1024);
        let client = WsClient::new(config.connection(), frame_tx);
        let client_shutdown = shutdown.clone();
        let conn = tokio::spawn(async move {
            if let Err(e) = client.run(client_shutdown).await {
                warn!(?e, "Exchange feed connection loop ended");
            }
        });

        info!(url = %config.url, "Exchange feed starting");
        metrics::FEED_UP
            .with_label_values(&[TickSource::Exchange.as_str()])
            .set(1.0);

        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break };
                    match parse_ticker_frame(&frame) {
                        Ok(Some((symbol, price))) => {
                            queue.push(Tick::price(TickSource::Exchange, symbol, mono_ns(), price));
                        }
                        Ok(None) => {}
                        Err(e) => warn!(?e, "Unparseable exchange frame"),
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
            .with_label_values(&[TickSource::Exchange.as_str()])
            .set(0.0);
        let _ = conn.await;
        info!("Exchange feed stopped");
    })
}
