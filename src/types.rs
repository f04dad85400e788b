//! Fixed-width chain identifiers shared across the crate
//!
//! Addresses and transaction hashes travel as `0x`-prefixed hex on the
//! provider boundary and as raw bytes inside ABI words.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::GovernanceError;

/// 20-byte account or contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_hex::<20>(s)
            .map(Self)
            .map_err(|e| GovernanceError::InvalidResponse(format!("Invalid address '{}': {}", s, e)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// 32-byte transaction hash
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash([u8; 32]);

impl TxHash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for TxHash {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_hex::<32>(s).map(Self).map_err(|e| {
            GovernanceError::InvalidResponse(format!("Invalid transaction hash '{}': {}", s, e))
        })
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxHash::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Decode `0x`-prefixed hex into a byte vector
///
/// Accepts the empty payload `"0x"`. Odd-length payloads are rejected.
pub fn decode_hex_bytes(s: &str) -> Result<Vec<u8>, GovernanceError> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    hex::decode(digits)
        .map_err(|e| GovernanceError::InvalidResponse(format!("Invalid hex '{}': {}", s, e)))
}

/// Encode bytes as `0x`-prefixed lowercase hex
pub fn encode_hex_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a `0x`-prefixed quantity (e.g. `"0xaa36a7"`) into a u64
pub fn parse_quantity(s: &str) -> Result<u64, GovernanceError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| GovernanceError::InvalidResponse(format!("Quantity without 0x prefix: {}", s)))?;
    if digits.is_empty() {
        return Err(GovernanceError::InvalidResponse("Empty quantity".to_string()));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| GovernanceError::InvalidResponse(format!("Invalid quantity '{}': {}", s, e)))
}

/// Format a u64 as a `0x`-prefixed quantity without leading zeros
pub fn format_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| "missing 0x prefix".to_string())?;
    if digits.len() != N * 2 {
        return Err(format!("expected {} hex digits, got {}", N * 2, digits.len()));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out).map_err(|e| e.to_string())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_is_case_insensitive() {
        let lower: Address = "0x64b2428983d5ab66ad0849b93d83113b980ccf32".parse().unwrap();
        let mixed: Address = "0x64B2428983d5AB66ad0849b93d83113b980CCF32".parse().unwrap();
        assert_eq!(lower, mixed);
        assert_eq!(mixed.to_string(), "0x64b2428983d5ab66ad0849b93d83113b980ccf32");
    }

    #[test]
    fn test_address_rejects_bad_input() {
        assert!("64b2428983d5ab66ad0849b93d83113b980ccf32".parse::<Address>().is_err());
        assert!("0x1234".parse::<Address>().is_err());
        assert!("0xzzb2428983d5ab66ad0849b93d83113b980ccf32".parse::<Address>().is_err());
    }

    #[test]
    fn test_quantity() {
        assert_eq!(parse_quantity("0xaa36a7").unwrap(), 11_155_111);
        assert_eq!(format_quantity(11_155_111), "0xaa36a7");
        assert_eq!(format_quantity(0), "0x0");
        assert!(parse_quantity("aa36a7").is_err());
        assert!(parse_quantity("0x").is_err());
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(decode_hex_bytes("0x").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex_bytes("0x0a0b").unwrap(), vec![0x0a, 0x0b]);
        assert!(decode_hex_bytes("0x0").is_err());
        assert_eq!(encode_hex_bytes(&[0xde, 0xad]), "0xdead");
    }

    #[test]
    fn test_address_serde_as_string() {
        let address: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"0x00000000000000000000000000000000000000aa\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
