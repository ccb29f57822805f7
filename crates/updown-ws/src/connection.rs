//! WebSocket connection manager.
//!
//! Handles connection lifecycle, automatic reconnection with
//! exponential backoff, and subscription replay after reconnection.
//! Raw text frames are forwarded to the owner; parsing is the owner's
//! concern.

use crate::error::{WsError, WsResult};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL.
    pub url: String,
    /// JSON payloads sent after every (re)connect, in order.
    pub subscribe_payloads: Vec<serde_json::Value>,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            subscribe_payloads: Vec::new(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 5_000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Reconnecting WebSocket client.
pub struct WsClient {
    config: ConnectionConfig,
    state: Arc<RwLock<ConnectionState>>,
    frame_tx: mpsc::Sender<String>,
    reconnect_count: Arc<RwLock<u32>>,
}

impl WsClient {
    /// Create a new client forwarding text frames to `frame_tx`.
    pub fn new(config: ConnectionConfig, frame_tx: mpsc::Sender<String>) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            frame_tx,
            reconnect_count: Arc::new(RwLock::new(0)),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Run the connect/reconnect loop until `shutdown` flips true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WsResult<()> {
        let mut attempt = 0u32;

        loop {
            if *shutdown.borrow() {
                *self.state.write() = ConnectionState::Disconnected;
                return Ok(());
            }

            *self.state.write() = ConnectionState::Connecting;

            match self.connect_once(&mut shutdown).await {
                Ok(()) => {
                    info!(url = %self.config.url, "WebSocket connection closed");
                    if *shutdown.borrow() {
                        *self.state.write() = ConnectionState::Disconnected;
                        return Ok(());
                    }
                }
                Err(WsError::Shutdown) => {
                    *self.state.write() = ConnectionState::Disconnected;
                    return Ok(());
                }
                Err(e) => {
                    error!(url = %self.config.url, ?e, "WebSocket connection error");
                }
            }

            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                return Err(WsError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            *self.state.write() = ConnectionState::Reconnecting;

            let delay = self.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        *self.state.write() = ConnectionState::Disconnected;
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn connect_once(&self, shutdown: &mut watch::Receiver<bool>) -> WsResult<()> {
        debug!(url = %self.config.url, "Connecting to WebSocket");

        let (ws_stream, _response) = connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        *self.state.write() = ConnectionState::Connected;
        *self.reconnect_count.write() = 0;
        info!(url = %self.config.url, "WebSocket connected");

        for payload in &self.config.subscribe_payloads {
            let msg = serde_json::to_string(payload)?;
            write.send(Message::Text(msg)).await?;
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if self.frame_tx.send(text.to_string()).await.is_err() {
                                warn!("Frame receiver dropped, closing connection");
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "WebSocket closed by server");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(?e, "WebSocket read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return Err(WsError::Shutdown);
                    }
                }
            }
        }
    }

    /// Exponential backoff: base * 2^(attempt-1), capped at max.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;
        let exp = attempt.saturating_sub(1).min(16);
        let delay = base.saturating_mul(1u64 << exp).min(max);
        Duration::from_millis(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: u64, max: u64) -> WsClient {
        let (tx, _rx) = mpsc::channel(8);
        WsClient::new(
            ConnectionConfig {
                reconnect_base_delay_ms: base,
                reconnect_max_delay_ms: max,
                ..Default::default()
            },
            tx,
        )
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let c = client(500, 5_000);
        assert_eq!(c.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(c.backoff_delay(2), Duration::from_millis(1_000));
        assert_eq!(c.backoff_delay(3), Duration::from_millis(2_000));
        assert_eq!(c.backoff_delay(4), Duration::from_millis(4_000));
        assert_eq!(c.backoff_delay(5), Duration::from_millis(5_000));
        assert_eq!(c.backoff_delay(30), Duration::from_millis(5_000));
    }

    #[test]
    fn test_initial_state() {
        let c = client(500, 5_000);
        assert_eq!(c.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown() {
        let c = client(1, 2);
        let (tx, rx) = watch::channel(true);
        drop(tx);
        // Already-shutdown receiver: run returns immediately.
        assert!(c.run(rx).await.is_ok());
    }
}
