//! Live CLOB execution client.
//!
//! Speaks the venue's REST API: HMAC-signed L2 headers on every
//! request, an EVM-key order signature on placement. Credential
//! material is zeroized on drop and never appears in error output.

use crate::client::{ExecutionClient, TradingMode};
use crate::error::{ExecError, ExecResult};
use crate::order::{OrderRequest, OrderStatus, PlacedOrder};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha256;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use updown_core::{OrderSide, Size};
use updown_telemetry::redact;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Venue credentials. Secrets are zeroized on drop.
pub struct Credentials {
    pub api_key: String,
    pub api_secret: Zeroizing<String>,
    pub passphrase: Zeroizing<String>,
    pub private_key: Zeroizing<String>,
    pub funder_address: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .field("private_key", &"<redacted>")
            .field("funder_address", &self.funder_address)
            .finish()
    }
}

/// Live client configuration.
#[derive(Debug, Clone)]
pub struct LiveExecutorConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for LiveExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://clob.polymarket.com".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// Live CLOB client.
#[derive(Debug)]
pub struct LiveExecutor {
    config: LiveExecutorConfig,
    credentials: Credentials,
    signer: PrivateKeySigner,
    http: reqwest::Client,
}

/// HMAC-SHA256 signature over `timestamp + method + path + body`,
/// hex-encoded. The venue's L2 authentication scheme.
pub fn l2_signature(secret: &str, timestamp: i64, method: &str, path: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{timestamp}{method}{path}{body}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

impl LiveExecutor {
    pub fn new(config: LiveExecutorConfig, credentials: Credentials) -> ExecResult<Self> {
        let signer = PrivateKeySigner::from_str(credentials.private_key.trim())
            .map_err(|e| ExecError::CredentialsMissing(redact(&format!("bad private key: {e}"))))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            config,
            credentials,
            signer,
            http,
        })
    }

    fn auth_headers(
        &self,
        method: &str,
        path: &str,
        body: &str,
    ) -> Vec<(&'static str, String)> {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = l2_signature(
            &self.credentials.api_secret,
            timestamp,
            method,
            path,
            body,
        );
        vec![
            ("POLY_ADDRESS", self.credentials.funder_address.clone()),
            ("POLY_API_KEY", self.credentials.api_key.clone()),
            ("POLY_PASSPHRASE", self.credentials.passphrase.to_string()),
            ("POLY_TIMESTAMP", timestamp.to_string()),
            ("POLY_SIGNATURE", signature),
        ]
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> ExecResult<Value> {
        let body_text = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        let url = format!("{}{}", self.config.base_url, path);

        let mut request = self.http.request(method.clone(), &url);
        for (name, value) in self.auth_headers(method.as_str(), path, &body_text) {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ExecError::AuthFailed(redact(&payload.to_string())));
        }
        if !status.is_success() {
            let detail = payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown venue error");
            return Err(ExecError::Venue(redact(&format!("{status}: {detail}"))));
        }
        Ok(payload)
    }

    /// Order signature payload: a canonical digest of the order fields
    /// signed with the trading key.
    fn sign_order(&self, order: &OrderRequest, salt: i64) -> ExecResult<String> {
        let canonical = format!(
            "{}:{}:{}:{}:{}:{}",
            self.credentials.funder_address,
            order.token_id,
            order.side,
            order.price,
            order.size,
            salt
        );
        let signature = self
            .signer
            .sign_message_sync(canonical.as_bytes())
            .map_err(|e| ExecError::Venue(redact(&format!("signing failed: {e}"))))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

fn parse_decimal_field(payload: &Value, key: &str) -> Decimal {
    match payload.get(key) {
        Some(Value::String(s)) => Decimal::from_str(s).unwrap_or(Decimal::ZERO),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

#[async_trait]
impl ExecutionClient for LiveExecutor {
    async fn place_order(&self, order: OrderRequest) -> ExecResult<PlacedOrder> {
        let salt = chrono::Utc::now().timestamp_millis();
        let signature = self.sign_order(&order, salt)?;

        let body = json!({
            "order": {
                "salt": salt,
                "maker": self.credentials.funder_address,
                "tokenID": order.token_id,
                "side": match order.side { OrderSide::Buy => "BUY", OrderSide::Sell => "SELL" },
                "price": order.price.to_string(),
                "size": order.size.to_string(),
                "signature": signature,
            },
            "orderType": "GTC",
        });

        let payload = self.request(reqwest::Method::POST, "/order", Some(body)).await?;

        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let reason = payload
                .get("errorMsg")
                .and_then(Value::as_str)
                .unwrap_or("order rejected");
            return Err(ExecError::Rejected(redact(reason)));
        }

        let order_id = payload
            .get("orderID")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let status = match payload.get("status").and_then(Value::as_str) {
            Some("matched") => OrderStatus::Matched,
            Some("live") | None => OrderStatus::Live,
            Some(other) => {
                warn!(status = other, "Unknown order status from venue");
                OrderStatus::Live
            }
        };
        let taking = parse_decimal_field(&payload, "takingAmount");
        let making = parse_decimal_field(&payload, "makingAmount");
        let tx_hashes = payload.get("transactionsHashes").and_then(|v| {
            v.as_array().map(|hashes| {
                hashes
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
        });

        debug!(order_id, ?status, "Live order placed");
        Ok(PlacedOrder {
            order_id,
            status,
            making: Size::new(making),
            taking: Size::new(taking),
            fill_price: if taking.is_zero() {
                None
            } else {
                Some(order.price)
            },
            tx_hashes,
        })
    }

    async fn cancel(&self, order_id: &str) -> ExecResult<()> {
        let body = json!({ "orderID": order_id });
        self.request(reqwest::Method::DELETE, "/order", Some(body))
            .await?;
        debug!(order_id, "Live order cancelled");
        Ok(())
    }

    async fn get_balance<'a>(&self, token_id: Option<&'a str>) -> ExecResult<Decimal> {
        let path = match token_id {
            Some(token) => format!("/balance-allowance?asset_type=CONDITIONAL&token_id={token}"),
            None => "/balance-allowance?asset_type=COLLATERAL".to_string(),
        };
        let payload = self.request(reqwest::Method::GET, &path, None).await?;
        Ok(parse_decimal_field(&payload, "balance"))
    }

    fn mode(&self) -> TradingMode {
        TradingMode::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_signature_deterministic() {
        let a = l2_signature("secret", 1700000000, "POST", "/order", "{}");
        let b = l2_signature("secret", 1700000000, "POST", "/order", "{}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        // Any input change moves the signature.
        assert_ne!(a, l2_signature("secret", 1700000001, "POST", "/order", "{}"));
        assert_ne!(a, l2_signature("other", 1700000000, "POST", "/order", "{}"));
        assert_ne!(a, l2_signature("secret", 1700000000, "GET", "/order", "{}"));
    }

    #[test]
    fn test_parse_decimal_field_variants() {
        let payload = json!({"a": "1.5", "b": 2, "c": true});
        assert_eq!(parse_decimal_field(&payload, "a"), Decimal::new(15, 1));
        assert_eq!(parse_decimal_field(&payload, "b"), Decimal::from(2));
        assert_eq!(parse_decimal_field(&payload, "c"), Decimal::ZERO);
        assert_eq!(parse_decimal_field(&payload, "missing"), Decimal::ZERO);
    }

    #[test]
    fn test_bad_private_key_redacted() {
        let credentials = Credentials {
            api_key: "key".into(),
            api_secret: Zeroizing::new("secret".into()),
            passphrase: Zeroizing::new("pass".into()),
            private_key: Zeroizing::new(format!("0x{}", "ab".repeat(31))),
            funder_address: "0x0000000000000000000000000000000000000001".into(),
        };
        let err = LiveExecutor::new(LiveExecutorConfig::default(), credentials).unwrap_err();
        let message = err.to_string();
        assert!(!message.contains(&"ab".repeat(31)), "key must be redacted");
    }
}
