//! # ECDSA Signatures (secp256k1)
//!
//! Ethereum account keys.
//!
//! ## Security Properties
//!
//! - RFC 6979 deterministic nonces (no RNG dependency for signing)
//! - Low-S normalization (EIP-2)
//! - Recoverable signatures (`r || s || v`)

use crate::hashing::keccak256;
use crate::CryptoError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use shared_types::Address;
use zeroize::Zeroize;

/// Recoverable signature as used by Ethereum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// `r` component.
    pub r: [u8; 32],
    /// `s` component (low-S).
    pub s: [u8; 32],
    /// Recovery id (0 or 1).
    pub recovery_id: u8,
}

impl RecoverableSignature {
    /// 65-byte `r || s || v` with `v = 27 + recovery_id`, as `0x` hex.
    pub fn to_rpc_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&self.r);
        bytes.extend_from_slice(&self.s);
        bytes.push(27 + self.recovery_id);
        format!("0x{}", hex::encode(bytes))
    }

    /// Parse a 65-byte `r || s || v` hex signature.
    pub fn from_rpc_hex(value: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(value.trim_start_matches("0x"))
            .map_err(|_| CryptoError::InvalidSignature)?;
        if bytes.len() != 65 {
            return Err(CryptoError::InvalidSignature);
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        let v = bytes[64];
        let recovery_id = if v >= 27 { v - 27 } else { v };
        if recovery_id > 1 {
            return Err(CryptoError::InvalidSignature);
        }
        Ok(Self { r, s, recovery_id })
    }
}

/// secp256k1 keypair bound to an Ethereum address.
pub struct EthKeyPair {
    signing_key: SigningKey,
    address: Address,
}

impl EthKeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Create from secret key bytes (32 bytes).
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(signing_key))
    }

    /// Create from a `0x`-optional hex private key.
    pub fn from_hex(value: &str) -> Result<Self, CryptoError> {
        let mut decoded = hex::decode(value.trim().trim_start_matches("0x"))
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        if decoded.len() != 32 {
            decoded.zeroize();
            return Err(CryptoError::InvalidPrivateKey);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        let result = Self::from_bytes(bytes);
        bytes.zeroize();
        result
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_of(signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Account address.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Sign a 32-byte digest.
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<RecoverableSignature, CryptoError> {
        let (signature, recovery_id): (Signature, RecoveryId) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        Ok(RecoverableSignature {
            r,
            s,
            recovery_id: recovery_id.to_byte(),
        })
    }

    /// Secret key as hex (for vault serialization).
    pub fn to_hex(&self) -> String {
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        let encoded = hex::encode(bytes);
        bytes.zeroize();
        encoded
    }
}

impl Drop for EthKeyPair {
    fn drop(&mut self) {
        // Zeroize secret key material
        let mut bytes: [u8; 32] = self.signing_key.to_bytes().into();
        bytes.zeroize();
    }
}

impl std::fmt::Debug for EthKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthKeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn address_of(verifying_key: &VerifyingKey) -> Address {
    let point = verifying_key.to_encoded_point(false);
    // Uncompressed SEC1: 0x04 || x || y
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::from_bytes(bytes)
}

/// Recover the signer address of a digest.
pub fn recover_address(
    hash: &[u8; 32],
    signature: &RecoverableSignature,
) -> Result<Address, CryptoError> {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(&signature.r);
    bytes[32..].copy_from_slice(&signature.s);
    let sig = Signature::from_slice(&bytes).map_err(|_| CryptoError::InvalidSignature)?;
    let recovery_id =
        RecoveryId::from_byte(signature.recovery_id).ok_or(CryptoError::InvalidSignature)?;
    let key = VerifyingKey::recover_from_prehash(hash, &sig, recovery_id)
        .map_err(|_| CryptoError::InvalidSignature)?;
    Ok(address_of(&key))
}
