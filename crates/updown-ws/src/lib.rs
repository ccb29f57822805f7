//! Reconnecting WebSocket client shared by the price-feed subscribers.
//!
//! Each subscriber owns one [`WsClient`]; the client handles the
//! connection lifecycle (exponential backoff, subscription replay on
//! reconnect) and forwards raw text frames to the subscriber's parser
//! over a bounded channel.

pub mod connection;
pub mod error;

pub use connection::{ConnectionConfig, ConnectionState, WsClient};
pub use error::{WsError, WsResult};

/// Initialize the rustls crypto provider. Must run before the first
/// TLS connection; calling it more than once is harmless.
pub fn init_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}
