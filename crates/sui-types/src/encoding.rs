//! Address parsing and base64 helpers.

use anyhow::{anyhow, Result};
use move_core_types::account_address::AccountAddress;

/// Parse a hex string to an AccountAddress with context-aware error message.
///
/// # Arguments
/// * `hex_str` - Hex string (with or without 0x prefix)
/// * `context` - Description for error messages (e.g., "object ID", "sender")
pub fn parse_address(hex_str: &str, context: &str) -> Result<AccountAddress> {
    let trimmed = hex_str.trim();
    let literal = if trimmed.starts_with("0x") {
        trimmed.to_string()
    } else {
        format!("0x{}", trimmed)
    };
    AccountAddress::from_hex_literal(&literal)
        .map_err(|e| anyhow!("Invalid {} '{}': {}", context, hex_str, e))
}

/// Encode bytes to base64 string.
pub fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode base64 string to bytes with context-aware error message.
pub fn base64_decode(b64: &str, context: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| anyhow!("Failed to decode {} from base64: {}", context, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0x2", "object ID").unwrap();
        assert_eq!(addr, AccountAddress::from_hex_literal("0x2").unwrap());
        assert_eq!(parse_address(" ab ", "object ID").unwrap(), parse_address("0xab", "x").unwrap());

        let err = parse_address("zz", "sender").unwrap_err();
        assert!(err.to_string().contains("Invalid sender"));
    }

    #[test]
    fn test_base64_decode_error() {
        let result = base64_decode("not-valid-base64!!!", "transaction bytes");
        assert!(result.unwrap_err().to_string().contains("transaction bytes"));
        assert_eq!(base64_decode(&base64_encode(b"ptb"), "x").unwrap(), b"ptb");
    }
}
