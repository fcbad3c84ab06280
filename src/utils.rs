// Utility helpers

use crate::constants::ADDRESS_HEX_LEN;

/// `0x` followed by exactly 40 hex digits, either case.
pub fn is_evm_address(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .map(|rest| rest.len() == ADDRESS_HEX_LEN && rest.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Random 32-char hex identifier.
pub fn random_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Shortens long hex strings for log lines.
pub fn short_hex(value: &str) -> String {
    if value.len() <= 14 || !value.is_ascii() {
        return value.to_string();
    }
    format!("{}…{}", &value[..8], &value[value.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_evm_address_checks_prefix_length_and_digits() {
        assert!(is_evm_address(&format!("0x{}", "11".repeat(20))));
        assert!(is_evm_address("0xAbCdEf0123456789abcdef0123456789ABCDEF01"));
        assert!(!is_evm_address(&"11".repeat(21)));
        assert!(!is_evm_address(&format!("0x{}", "1".repeat(39))));
        assert!(!is_evm_address(&format!("0x{}", "1".repeat(41))));
        assert!(!is_evm_address(&format!("0x{}g", "1".repeat(39))));
    }

    #[test]
    fn random_id_is_hex() {
        let id = random_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_id());
    }

    #[test]
    fn short_hex_keeps_short_values() {
        assert_eq!(short_hex("0xabc"), "0xabc");
        let hash = format!("0x{}", "ab".repeat(32));
        assert_eq!(short_hex(&hash), "0xababab…abab");
    }
}
