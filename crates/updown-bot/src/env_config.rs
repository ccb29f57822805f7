//! Environment configuration.
//!
//! Built once at startup, validated, and treated as immutable for the
//! process lifetime. Bad values are fatal with actionable messages;
//! no credential substring ever appears in error output.

use crate::error::{AppError, AppResult};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use updown_exec::TradingMode;
use updown_telemetry::redact;
use zeroize::Zeroizing;

const CREDENTIAL_KEYS: [&str; 5] = [
    "POLYMARKET_API_KEY",
    "POLYMARKET_API_SECRET",
    "POLYMARKET_PASSPHRASE",
    "POLYMARKET_PRIVATE_KEY",
    "POLYMARKET_FUNDER_ADDRESS",
];

/// Venue credentials pulled from the environment. All five are
/// required in LIVE mode.
pub struct EnvCredentials {
    pub api_key: String,
    pub api_secret: Zeroizing<String>,
    pub passphrase: Zeroizing<String>,
    pub private_key: Zeroizing<String>,
    pub funder_address: String,
}

impl std::fmt::Debug for EnvCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .field("private_key", &"<redacted>")
            .field("funder_address", &self.funder_address)
            .finish()
    }
}

/// Validated process configuration from the environment.
pub struct EnvConfig {
    pub mode: TradingMode,
    /// Absent is allowed in PAPER mode (no durable state).
    pub database_url: Option<String>,
    pub credentials: Option<EnvCredentials>,
    pub starting_capital: Decimal,
    pub log_level: Option<String>,
}

impl std::fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvConfig")
            .field("mode", &self.mode)
            .field("database_url", &self.database_url)
            .field("credentials", &self.credentials)
            .field("starting_capital", &self.starting_capital)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl EnvConfig {
    /// Read and validate from the real environment.
    pub fn from_env() -> AppResult<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_map(&vars)
    }

    /// Read and validate from an explicit map (testable).
    pub fn from_map(vars: &HashMap<String, String>) -> AppResult<Self> {
        let mode = match vars.get("TRADING_MODE").map(String::as_str) {
            None | Some("PAPER") => TradingMode::Paper,
            Some("LIVE") => {
                if vars.get("CONFIRM_LIVE_TRADING").map(String::as_str) != Some("true") {
                    return Err(AppError::Config(
                        "TRADING_MODE=LIVE requires CONFIRM_LIVE_TRADING=true; \
                         set it explicitly or switch to PAPER"
                            .into(),
                    ));
                }
                TradingMode::Live
            }
            Some(other) => {
                return Err(AppError::Config(format!(
                    "TRADING_MODE must be PAPER or LIVE, got '{}'",
                    redact(other)
                )));
            }
        };

        let database_url = vars.get("DATABASE_URL").cloned();
        if let Some(url) = &database_url {
            validate_database_url(url, mode)?;
        } else if mode == TradingMode::Live {
            return Err(AppError::Config(
                "DATABASE_URL is required in LIVE mode".into(),
            ));
        }

        let credentials = read_credentials(vars, mode)?;

        let starting_capital = match vars.get("STARTING_CAPITAL") {
            None => Decimal::from(1000),
            Some(raw) => {
                let value = Decimal::from_str(raw).map_err(|_| {
                    AppError::Config(format!(
                        "STARTING_CAPITAL must be numeric, got '{}'",
                        redact(raw)
                    ))
                })?;
                if value.is_sign_negative() {
                    return Err(AppError::Config(
                        "STARTING_CAPITAL must be >= 0".into(),
                    ));
                }
                value
            }
        };

        Ok(Self {
            mode,
            database_url,
            credentials,
            starting_capital,
            log_level: vars.get("LOG_LEVEL").cloned(),
        })
    }
}

fn validate_database_url(url: &str, mode: TradingMode) -> AppResult<()> {
    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        return Err(AppError::Config(
            "DATABASE_URL protocol must be postgres:// or postgresql://".into(),
        ));
    }
    if mode == TradingMode::Live {
        let has_ssl = url.split('?').nth(1).map(|query| {
            query.split('&').any(|pair| {
                matches!(
                    pair,
                    "sslmode=require" | "sslmode=verify-ca" | "sslmode=verify-full" | "ssl=true"
                )
            })
        });
        if has_ssl != Some(true) {
            return Err(AppError::Config(
                "LIVE mode requires DATABASE_URL with sslmode in \
                 {require, verify-ca, verify-full} or ssl=true"
                    .into(),
            ));
        }
    }
    Ok(())
}

fn read_credentials(
    vars: &HashMap<String, String>,
    mode: TradingMode,
) -> AppResult<Option<EnvCredentials>> {
    let missing: Vec<&str> = CREDENTIAL_KEYS
        .iter()
        .filter(|key| !vars.contains_key(**key))
        .copied()
        .collect();

    if missing.len() == CREDENTIAL_KEYS.len() {
        // No credentials at all: fine for paper, fatal for live.
        return if mode == TradingMode::Live {
            Err(AppError::Credentials(format!(
                "LIVE mode requires {}",
                CREDENTIAL_KEYS.join(", ")
            )))
        } else {
            Ok(None)
        };
    }
    if !missing.is_empty() {
        return Err(AppError::Credentials(format!(
            "incomplete venue credentials, missing {}",
            missing.join(", ")
        )));
    }

    Ok(Some(EnvCredentials {
        api_key: vars["POLYMARKET_API_KEY"].clone(),
        api_secret: Zeroizing::new(vars["POLYMARKET_API_SECRET"].clone()),
        passphrase: Zeroizing::new(vars["POLYMARKET_PASSPHRASE"].clone()),
        private_key: Zeroizing::new(vars["POLYMARKET_PRIVATE_KEY"].clone()),
        funder_address: vars["POLYMARKET_FUNDER_ADDRESS"].clone(),
    }))
}
