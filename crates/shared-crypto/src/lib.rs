//! # Shared Crypto - Wallet Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `ecdsa` | secp256k1 | Account keys, transaction and message signing |
//! | `hashing` | Keccak-256 | Addresses, message digests |
//! | `typed_data` | EIP-712 | Structured data signing (v3/v4) |
//! | `vault` | Argon2id + XChaCha20-Poly1305 | Password-encrypted keyring vault |
//!
//! ## Security Properties
//!
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization (EIP-2)
//! - **XChaCha20**: 192-bit nonce, constant-time, side-channel immune
//! - **Argon2id**: memory-hard password stretching per vault

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ecdsa;
pub mod errors;
pub mod hashing;
pub mod typed_data;
pub mod vault;

// Re-exports
pub use ecdsa::{recover_address, EthKeyPair, RecoverableSignature};
pub use errors::CryptoError;
pub use hashing::{keccak256, personal_message_hash};
pub use typed_data::{hash_typed_data, TypedData, TypedDataVersion};
pub use vault::{decrypt_vault, encrypt_vault, KdfParams, VaultKey};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
