//! # EIP-712 Typed Data Hashing
//!
//! Computes the digest signed by `eth_signTypedData_v3` and `_v4`:
//! `keccak256(0x19 || 0x01 || hashStruct(domain) || hashStruct(message))`.
//!
//! v3 and v4 differ only in that v4 supports arrays and encodes missing
//! nested structs as zero words.

use crate::hashing::keccak256;
use crate::CryptoError;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

const DOMAIN_TYPE: &str = "EIP712Domain";

/// Typed data encoding version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedDataVersion {
    /// `eth_signTypedData_v3`
    V3,
    /// `eth_signTypedData_v4`
    V4,
}

/// One member of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedField {
    /// Member name.
    pub name: String,
    /// Solidity type.
    #[serde(rename = "type")]
    pub field_type: String,
}

/// EIP-712 payload as sent by dapps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// Struct type definitions.
    pub types: BTreeMap<String, Vec<TypedField>>,
    /// Name of the message's struct type.
    pub primary_type: String,
    /// Domain separator values.
    #[serde(default)]
    pub domain: Value,
    /// Message values.
    #[serde(default)]
    pub message: Value,
}

impl TypedData {
    /// Parse from a JSON string or an already-decoded value.
    pub fn from_value(value: &Value) -> Result<Self, CryptoError> {
        let parsed = match value {
            Value::String(s) => serde_json::from_str(s),
            other => serde_json::from_value(other.clone()),
        };
        parsed.map_err(|e| CryptoError::InvalidTypedData(e.to_string()))
    }
}

/// Digest to sign for `data`.
pub fn hash_typed_data(data: &TypedData, version: TypedDataVersion) -> Result<[u8; 32], CryptoError> {
    let encoder = Encoder {
        types: &data.types,
        version,
    };

    let mut buf = Vec::with_capacity(66);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(&encoder.hash_struct(DOMAIN_TYPE, &data.domain)?);
    if data.primary_type != DOMAIN_TYPE {
        buf.extend_from_slice(&encoder.hash_struct(&data.primary_type, &data.message)?);
    }
    Ok(keccak256(&buf))
}

struct Encoder<'a> {
    types: &'a BTreeMap<String, Vec<TypedField>>,
    version: TypedDataVersion,
}

impl Encoder<'_> {
    fn fields(&self, type_name: &str) -> Result<&[TypedField], CryptoError> {
        match self.types.get(type_name) {
            Some(fields) => Ok(fields),
            // A domain with no declared type hashes as an empty struct.
            None if type_name == DOMAIN_TYPE => Ok(&[]),
            None => Err(CryptoError::InvalidTypedData(format!("unknown type {type_name}"))),
        }
    }

    fn collect_dependencies(&self, type_name: &str, found: &mut BTreeSet<String>) -> Result<(), CryptoError> {
        let base = strip_array(type_name);
        if found.contains(base) || !self.types.contains_key(base) {
            return Ok(());
        }
        found.insert(base.to_string());
        for field in self.fields(base)? {
            self.collect_dependencies(&field.field_type, found)?;
        }
        Ok(())
    }

    fn encode_type(&self, type_name: &str) -> Result<String, CryptoError> {
        let mut deps = BTreeSet::new();
        self.collect_dependencies(type_name, &mut deps)?;
        deps.remove(type_name);

        let mut out = String::new();
        for name in std::iter::once(type_name.to_string()).chain(deps) {
            let members: Vec<String> = self
                .fields(&name)?
                .iter()
                .map(|f| format!("{} {}", f.field_type, f.name))
                .collect();
            out.push_str(&format!("{}({})", name, members.join(",")));
        }
        Ok(out)
    }

    fn hash_struct(&self, type_name: &str, value: &Value) -> Result<[u8; 32], CryptoError> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&keccak256(self.encode_type(type_name)?.as_bytes()));
        for field in self.fields(type_name)? {
            let member = value.get(&field.name).unwrap_or(&Value::Null);
            buf.extend_from_slice(&self.encode_value(&field.field_type, member)?);
        }
        Ok(keccak256(&buf))
    }

    fn encode_value(&self, field_type: &str, value: &Value) -> Result<[u8; 32], CryptoError> {
        if self.types.contains_key(field_type) {
            if value.is_null() {
                return Ok([0u8; 32]);
            }
            return self.hash_struct(field_type, value);
        }

        if field_type.ends_with(']') {
            if self.version == TypedDataVersion::V3 {
                return Err(CryptoError::InvalidTypedData(
                    "arrays are unsupported in v3".into(),
                ));
            }
            let item_type = strip_last_array(field_type);
            let items = value
                .as_array()
                .ok_or_else(|| CryptoError::InvalidTypedData(format!("{field_type} expects an array")))?;
            let mut buf = Vec::with_capacity(items.len() * 32);
            for item in items {
                buf.extend_from_slice(&self.encode_value(item_type, item)?);
            }
            return Ok(keccak256(&buf));
        }

        match field_type {
            "string" => Ok(keccak256(value.as_str().unwrap_or_default().as_bytes())),
            "bytes" => Ok(keccak256(&bytes_of(value)?)),
            "bool" => Ok(word(U256::from(u8::from(value.as_bool().unwrap_or(false))))),
            "address" => {
                let raw = bytes_of(value)?;
                if raw.len() > 20 {
                    return Err(CryptoError::InvalidTypedData("address too long".into()));
                }
                let mut out = [0u8; 32];
                out[32 - raw.len()..].copy_from_slice(&raw);
                Ok(out)
            }
            t if t.starts_with("bytes") => {
                let raw = bytes_of(value)?;
                if raw.len() > 32 {
                    return Err(CryptoError::InvalidTypedData(format!("{t} value too long")));
                }
                let mut out = [0u8; 32];
                out[..raw.len()].copy_from_slice(&raw);
                Ok(out)
            }
            t if t.starts_with("uint") || t.starts_with("int") => Ok(word(integer_of(value)?)),
            other => Err(CryptoError::InvalidTypedData(format!("unsupported type {other}"))),
        }
    }
}

fn strip_array(type_name: &str) -> &str {
    type_name.split('[').next().unwrap_or(type_name)
}

fn strip_last_array(type_name: &str) -> &str {
    type_name.rfind('[').map_or(type_name, |i| &type_name[..i])
}

fn word(value: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

fn bytes_of(value: &Value) -> Result<Vec<u8>, CryptoError> {
    match value {
        Value::String(s) if s.starts_with("0x") => {
            hex::decode(&s[2..]).map_err(|e| CryptoError::InvalidTypedData(e.to_string()))
        }
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Null => Ok(Vec::new()),
        other => Err(CryptoError::InvalidTypedData(format!("expected bytes, got {other}"))),
    }
}

fn integer_of(value: &Value) -> Result<U256, CryptoError> {
    let invalid = || CryptoError::InvalidTypedData(format!("invalid integer {value}"));
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok(U256::from(u))
            } else if let Some(i) = n.as_i64() {
                Ok(twos_complement(i128::from(i)))
            } else {
                Err(invalid())
            }
        }
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x") {
                U256::from_str_radix(hex, 16).map_err(|_| invalid())
            } else if let Some(neg) = s.strip_prefix('-') {
                let magnitude: i128 = neg.parse().map_err(|_| invalid())?;
                Ok(twos_complement(-magnitude))
            } else {
                U256::from_dec_str(s).map_err(|_| invalid())
            }
        }
        Value::Null => Ok(U256::zero()),
        _ => Err(invalid()),
    }
}

fn twos_complement(value: i128) -> U256 {
    if value >= 0 {
        U256::from(value as u128)
    } else {
        !U256::from(value.unsigned_abs()) + U256::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mail() -> Value {
        json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "version", "type": "string"},
                    {"name": "chainId", "type": "uint256"},
                    {"name": "verifyingContract", "type": "address"}
                ],
                "Person": [
                    {"name": "name", "type": "string"},
                    {"name": "wallet", "type": "address"}
                ],
                "Mail": [
                    {"name": "from", "type": "Person"},
                    {"name": "to", "type": "Person"},
                    {"name": "contents", "type": "string"}
                ]
            },
            "primaryType": "Mail",
            "domain": {
                "name": "Ether Mail",
                "version": "1",
                "chainId": 1,
                "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
            },
            "message": {
                "from": {"name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"},
                "to": {"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"},
                "contents": "Hello, Bob!"
            }
        })
    }

    #[test]
    fn test_encode_type_orders_dependencies() {
        let data = TypedData::from_value(&mail()).unwrap();
        let encoder = Encoder { types: &data.types, version: TypedDataVersion::V4 };
        assert_eq!(
            encoder.encode_type("Mail").unwrap(),
            "Mail(Person from,Person to,string contents)Person(string name,address wallet)"
        );
    }

    #[test]
    fn test_reference_mail_digest() {
        // Mail example from EIP-712.
        let data = TypedData::from_value(&mail()).unwrap();
        let digest = hash_typed_data(&data, TypedDataVersion::V3).unwrap();
        assert_eq!(
            hex::encode(digest),
            "be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
    }

    #[test]
    fn test_v3_rejects_arrays() {
        let data = TypedData::from_value(&json!({
            "types": {
                "EIP712Domain": [],
                "Batch": [{"name": "ids", "type": "uint256[]"}]
            },
            "primaryType": "Batch",
            "domain": {},
            "message": {"ids": [1, 2, 3]}
        }))
        .unwrap();

        assert!(hash_typed_data(&data, TypedDataVersion::V3).is_err());
        assert!(hash_typed_data(&data, TypedDataVersion::V4).is_ok());
    }

    #[test]
    fn test_accepts_json_string_payload() {
        let as_string = Value::String(mail().to_string());
        assert!(TypedData::from_value(&as_string).is_ok());
    }

    #[test]
    fn test_negative_integers_use_twos_complement() {
        assert_eq!(twos_complement(-1), U256::MAX);
    }
}
