//! Oracle price subscribers: push WebSocket and SSE stream.
//!
//! Both feeds carry the same logical payload (symbol + oracle price);
//! the push feed delivers JSON frames over WebSocket, the SSE feed
//! delivers `data:` lines over a chunked HTTP response. Each absorbs
//! its own transport and emits normalized `Tick`s.

use crate::error::{FeedError, FeedResult};
use crate::mono_ns;
use crate::tick_queue::TickQueue;
use futures_util::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use updown_core::{Price, Symbol, Tick, TickSource};
use updown_telemetry::metrics;
use updown_ws::{ConnectionConfig, WsClient};

/// Oracle feed configuration, shared by both transports.
#[derive(Debug, Clone)]
pub struct OracleFeedConfig {
    /// Push WebSocket URL.
    pub push_url: String,
    /// SSE endpoint URL.
    pub sse_url: String,
    pub symbols: Vec<Symbol>,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

/// Parse an oracle payload `{"symbol":"BTC","price":"50123.45"}`.
///
/// The price field may be a JSON string or number.
pub fn parse_oracle_payload(payload: &str) -> FeedResult<Option<(Symbol, Price)>> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| FeedError::Parse(e.to_string()))?;

    let symbol = match value.get("symbol").and_then(Value::as_str) {
        Some(s) => Symbol::new(s),
        None => return Ok(None),
    };
    let price = match value.get("price") {
        Some(Value::String(s)) => s
            .parse()
            .map_err(|e| FeedError::Parse(format!("bad oracle price {s}: {e}")))?,
        Some(Value::Number(n)) => {
            let s = n.to_string();
            s.parse()
                .map_err(|e| FeedError::Parse(format!("bad oracle price {s}: {e}")))?
        }
        _ => return Err(FeedError::Parse("oracle payload missing price".into())),
    };
    Ok(Some((symbol, price)))
}

/// Extract the JSON payload from one SSE event block.
///
/// Multi-line `data:` fields are joined per the SSE spec; comment
/// lines (leading `:`) are skipped.
pub fn sse_event_data(block: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in block.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start());
        }
    }
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

/// Spawn the oracle push-WebSocket subscriber task.
pub fn spawn_oracle_push_feed(
    config: OracleFeedConfig,
    queue: TickQueue,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let subscribe = serde_json::json!({
            "op": "subscribe",
            "symbols": config.symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        });
        let conn_config = ConnectionConfig {
            url: config.push_url.clone(),
            subscribe_payloads: vec![subscribe],
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: config.reconnect_base_delay_ms,
            reconnect_max_delay_ms: config.reconnect_max_delay_ms,
        };

        let (frame_tx, mut frame_rx) = mpsc::channel::<String>(1024);
        let client = WsClient::new(conn_config, frame_tx);
        let client_shutdown = shutdown.clone();
        let conn = tokio::spawn(async move {
            if let Err(e) = client.run(client_shutdown).await {
                warn!(?e, "Oracle push connection loop ended");
            }
        });

        info!(url = %config.push_url, "Oracle push feed starting");
        metrics::FEED_UP
            .with_label_values(&[TickSource::OraclePush.as_str()])
            .set(1.0);

        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else { break };
                    match parse_oracle_payload(&frame) {
                        Ok(Some((symbol, price))) => {
                            queue.push(Tick::price(TickSource::OraclePush, symbol, mono_ns(), price));
                        }
                        Ok(None) => {}
                        Err(e) => warn!(?e, "Unparseable oracle push frame"),
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
            .with_label_values(&[TickSource::OraclePush.as_str()])
            .set(0.0);
        let _ = conn.await;
        info!("Oracle push feed stopped");
    })
}

/// Spawn the oracle SSE subscriber task.
///
/// Owns its own reconnect loop with the same backoff curve as the
/// WebSocket feeds: 500 ms doubling to a 5 s cap.
pub fn spawn_oracle_sse_feed(
    config: OracleFeedConfig,
    queue: TickQueue,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut attempt = 0u32;
        let mut shutdown = shutdown;

        info!(url = %config.sse_url, "Oracle SSE feed starting");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match stream_sse(&client, &config, &queue, &mut attempt, &mut shutdown).await {
                Ok(()) => break, // clean shutdown
                Err(e) => {
                    metrics::FEED_UP
                        .with_label_values(&[TickSource::OracleSse.as_str()])
                        .set(0.0);
                    attempt += 1;
                    let exp = attempt.saturating_sub(1).min(16);
                    let delay = config
                        .reconnect_base_delay_ms
                        .saturating_mul(1u64 << exp)
                        .min(config.reconnect_max_delay_ms);
                    warn!(?e, attempt, delay_ms = delay, "Oracle SSE reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        metrics::FEED_UP
            .with_label_values(&[TickSource::OracleSse.as_str()])
            .set(0.0);
        info!("Oracle SSE feed stopped");
    })
}

async fn stream_sse(
    client: &reqwest::Client,
    config: &OracleFeedConfig,
    queue: &TickQueue,
    attempt: &mut u32,
    shutdown: &mut watch::Receiver<bool>,
) -> FeedResult<()> {
    let response = client
        .get(&config.sse_url)
        .header("Accept", "text/event-stream")
        .send()
        .await?
        .error_for_status()?;

    // Connected: the backoff curve starts over.
    *attempt = 0;
    metrics::FEED_UP
        .with_label_values(&[TickSource::OracleSse.as_str()])
        .set(1.0);
    debug!("Oracle SSE stream open");

    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    loop {
        tokio::select! {
            chunk = stream.next() => {
                let chunk = match chunk {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(FeedError::Disconnected("SSE stream ended".into())),
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // Events are separated by a blank line.
                while let Some(pos) = buffer.find("\n\n") {
                    let block = buffer[..pos].to_string();
                    buffer.drain(..pos + 2);
                    let Some(data) = sse_event_data(&block) else { continue };
                    match parse_oracle_payload(&data) {
                        Ok(Some((symbol, price))) => {
                            queue.push(Tick::price(TickSource::OracleSse, symbol, mono_ns(), price));
                        }
                        Ok(None) => {}
                        Err(e) => warn!(?e, "Unparseable SSE event"),
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_string_price() {
        let (symbol, price) = parse_oracle_payload(r#"{"symbol":"BTC","price":"50123.45"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(symbol.as_str(), "BTC");
        assert_eq!(price.inner(), dec!(50123.45));
    }

    #[test]
    fn test_parse_numeric_price() {
        let (_, price) = parse_oracle_payload(r#"{"symbol":"ETH","price":3001.5}"#)
            .unwrap()
            .unwrap();
        assert_eq!(price.inner(), dec!(3001.5));
    }

    #[test]
    fn test_frame_without_symbol_ignored() {
        assert!(parse_oracle_payload(r#"{"type":"heartbeat"}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_price_is_error() {
        assert!(parse_oracle_payload(r#"{"symbol":"BTC"}"#).is_err());
    }

    #[test]
    fn test_sse_event_data() {
        let block = ": keepalive\nevent: price\ndata: {\"symbol\":\"BTC\",\"price\":\"1\"}";
        assert_eq!(
            sse_event_data(block).unwrap(),
            "{\"symbol\":\"BTC\",\"price\":\"1\"}"
        );
        assert!(sse_event_data(": keepalive only").is_none());
    }

    #[test]
    fn test_sse_multiline_data_joined() {
        let block = "data: {\"symbol\":\ndata: \"BTC\",\"price\":\"1\"}";
        assert_eq!(
            sse_event_data(block).unwrap(),
            "{\"symbol\":\n\"BTC\",\"price\":\"1\"}"
        );
    }
}
