//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Identity**: `Address`, `ChainId`
//! - **Quantities**: `U256` helpers for `0x`-prefixed JSON-RPC quantities

use crate::errors::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Re-export U256 from primitive-types for use across all crates
pub use primitive_types::U256;

/// Namespace prefix for EVM chains in CAIP-2 identifiers.
pub const EIP155_NAMESPACE: &str = "eip155";

/// A 20-byte Ethereum-style address, held as lowercase `0x` hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let trimmed = value.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ParseError::InvalidAddress(value.to_string()))?;

        if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidAddress(value.to_string()));
        }

        Ok(Self(format!("0x{}", hex_part.to_ascii_lowercase())))
    }

    /// Build an address from its raw 20 bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for b in bytes {
            out.push_str(&format!("{b:02x}"));
        }
        Self(out)
    }

    /// Raw 20 bytes of the address.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        let hex_part = &self.0[2..];
        for (i, slot) in out.iter_mut().enumerate() {
            // Validated at construction, so every pair is hex.
            *slot = u8::from_str_radix(&hex_part[i * 2..i * 2 + 2], 16).unwrap_or_default();
        }
        out
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address left-padded to a 32-byte ABI word (without `0x`).
    #[must_use]
    pub fn to_abi_word(&self) -> String {
        format!("{:0>64}", &self.0[2..])
    }
}

impl Default for Address {
    /// The zero address.
    fn default() -> Self {
        Self::from_bytes([0u8; 20])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// An EVM chain identifier.
///
/// Serialized as a `0x` hex string, the form the wallet exposes to dapps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId(pub u64);

impl ChainId {
    pub const MAINNET: ChainId = ChainId(1);
    pub const GOERLI: ChainId = ChainId(5);
    pub const SEPOLIA: ChainId = ChainId(11_155_111);
    pub const LINEA_MAINNET: ChainId = ChainId(59_144);
    pub const BSC: ChainId = ChainId(56);
    pub const POLYGON: ChainId = ChainId(137);

    /// Parse `0x`-hex, plain decimal or CAIP-2 (`eip155:<n>`).
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let trimmed = value.trim();
        let body = match trimmed.split_once(':') {
            Some((EIP155_NAMESPACE, reference)) => reference,
            Some(_) => return Err(ParseError::InvalidChainId(value.to_string())),
            None => trimmed,
        };

        let parsed = if let Some(hex) = body.strip_prefix("0x") {
            u64::from_str_radix(hex, 16)
        } else {
            body.parse::<u64>()
        };

        parsed
            .map(ChainId)
            .map_err(|_| ParseError::InvalidChainId(value.to_string()))
    }

    /// `0x`-prefixed hex form, e.g. `0x1`.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{:x}", self.0)
    }

    /// CAIP-2 form, e.g. `eip155:1`.
    #[must_use]
    pub fn to_caip2(&self) -> String {
        format!("{EIP155_NAMESPACE}:{}", self.0)
    }

    /// Decimal network id as returned by `net_version`.
    #[must_use]
    pub fn network_id(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ChainId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChainId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_hex()
    }
}

/// Parse a `0x`-prefixed JSON-RPC quantity.
pub fn parse_quantity(value: &str) -> Result<U256, ParseError> {
    let hex = value
        .strip_prefix("0x")
        .ok_or_else(|| ParseError::InvalidQuantity(value.to_string()))?;
    if hex.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(hex, 16).map_err(|_| ParseError::InvalidQuantity(value.to_string()))
}

/// Format a quantity as `0x`-prefixed hex without leading zeros.
#[must_use]
pub fn to_quantity(value: U256) -> String {
    format!("{value:#x}")
}

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_normalized() {
        let a = Address::parse("0xABCDEF0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(a.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(Address::from_bytes(a.to_bytes()), a);
    }

    #[test]
    fn test_address_rejects_short_input() {
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("abcdef0123456789abcdef0123456789abcdef01").is_err());
    }

    #[test]
    fn test_chain_id_forms() {
        assert_eq!(ChainId::parse("0x1").unwrap(), ChainId::MAINNET);
        assert_eq!(ChainId::parse("137").unwrap(), ChainId::POLYGON);
        assert_eq!(ChainId::parse("eip155:56").unwrap(), ChainId::BSC);
        assert!(ChainId::parse("cosmos:hub").is_err());
        assert_eq!(ChainId::SEPOLIA.to_hex(), "0xaa36a7");
        assert_eq!(ChainId::MAINNET.to_caip2(), "eip155:1");
    }

    #[test]
    fn test_chain_id_serde_uses_hex() {
        let json = serde_json::to_string(&ChainId::POLYGON).unwrap();
        assert_eq!(json, "\"0x89\"");
        let back: ChainId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChainId::POLYGON);
    }

    #[test]
    fn test_quantity_helpers() {
        assert_eq!(parse_quantity("0x0").unwrap(), U256::zero());
        assert_eq!(parse_quantity("0xde0b6b3a7640000").unwrap(), U256::exp10(18));
        assert_eq!(to_quantity(U256::from(255u64)), "0xff");
        assert!(parse_quantity("12").is_err());
    }
}
