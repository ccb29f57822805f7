//! Secret redaction for log and error output.
//!
//! Every error string that can reach a log line or user-visible output
//! passes through [`redact`] first. Patterns covered:
//! - Ethereum addresses (`0x` + 40 hex chars)
//! - bare hex runs of 40+ characters or exactly 64 characters
//! - `key=`, `secret=`, `password=`, `token=` value captures

use once_cell::sync::Lazy;
use regex::Regex;

const PLACEHOLDER: &str = "[REDACTED]";

static ETH_ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"0x[0-9a-fA-F]{40}").expect("eth address regex"));

// 40+ hex chars catches addresses without the 0x prefix and most API
// secrets; exactly-64 catches private keys and tx hashes.
static LONG_HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9a-fA-F]{40,}\b").expect("long hex regex"));

// The name may be prefixed (API_KEY, access_token), so the boundary
// anchors the whole identifier, not the suffix.
static KEY_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([a-z0-9_]*(?:key|secret|password|token))(\s*=\s*)([^\s&,;]+)")
        .expect("key=value regex")
});

/// Replace sensitive substrings with `[REDACTED]`.
pub fn redact(input: &str) -> String {
    let s = ETH_ADDRESS.replace_all(input, PLACEHOLDER);
    let s = LONG_HEX.replace_all(&s, PLACEHOLDER);
    let s = KEY_VALUE.replace_all(&s, |caps: &regex::Captures<'_>| {
        format!("{}{}{}", &caps[1], &caps[2], PLACEHOLDER)
    });
    s.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eth_address_redacted() {
        let msg = "auth failed for 0xAbCdEf0123456789abcdef0123456789ABCDEF01";
        assert_eq!(redact(msg), format!("auth failed for {PLACEHOLDER}"));
    }

    #[test]
    fn test_64_char_hex_redacted() {
        let key = "a".repeat(64);
        let msg = format!("bad signer {key}");
        assert_eq!(redact(&msg), format!("bad signer {PLACEHOLDER}"));
    }

    #[test]
    fn test_key_value_redacted() {
        assert_eq!(redact("secret=hunter2 rest"), "secret=[REDACTED] rest");
        assert_eq!(redact("API_KEY=abc123&x=1"), "API_KEY=[REDACTED]&x=1");
        assert_eq!(redact("password = topsecret"), "password = [REDACTED]");
    }

    #[test]
    fn test_short_hex_untouched() {
        // 8 hex chars is an ordinary id, not a secret.
        assert_eq!(redact("order deadbeef failed"), "order deadbeef failed");
    }

    #[test]
    fn test_plain_text_untouched() {
        let msg = "connection refused: localhost:5432";
        assert_eq!(redact(msg), msg);
    }
}
