//! # Password Vault
//!
//! Encrypts the serialized keyrings under a password. The key is stretched
//! with Argon2id using a per-vault random salt, and the payload is sealed with
//! XChaCha20-Poly1305 under a random 192-bit nonce.
//!
//! The vault is a self-describing JSON string, so it can be persisted or
//! backed up as an opaque value.

use crate::CryptoError;
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const VAULT_VERSION: u8 = 1;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost_kib: u32,
    /// Iterations.
    pub t_cost: u32,
    /// Parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost_kib: 19_456,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

impl KdfParams {
    /// Minimal cost, for development builds and tests.
    pub fn light() -> Self {
        Self {
            m_cost_kib: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// A derived 256-bit vault key, wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    /// Stretch `password` with `salt`.
    pub fn derive(password: &str, salt: &[u8], params: KdfParams) -> Result<Self, CryptoError> {
        let argon_params = Params::new(params.m_cost_kib, params.t_cost, params.p_cost, Some(KEY_LEN))
            .map_err(|e| CryptoError::KeyDerivationFailed(format!("Invalid Argon2 params: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(password.as_bytes(), salt, &mut key)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        Ok(Self(key))
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new((&self.0).into())
    }
}

#[derive(Serialize, Deserialize)]
struct VaultEnvelope {
    version: u8,
    kdf: KdfParams,
    salt: String,
    nonce: String,
    data: String,
}

/// Encrypt `plaintext` under `password`.
pub fn encrypt_vault(
    password: &str,
    plaintext: &[u8],
    params: KdfParams,
) -> Result<String, CryptoError> {
    let mut rng = rand::thread_rng();
    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    let key = VaultKey::derive(password, &salt, params)?;
    let ciphertext = key
        .cipher()
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let envelope = VaultEnvelope {
        version: VAULT_VERSION,
        kdf: params,
        salt: hex::encode(salt),
        nonce: hex::encode(nonce),
        data: hex::encode(ciphertext),
    };
    serde_json::to_string(&envelope).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Decrypt a vault produced by [`encrypt_vault`].
///
/// # Errors
///
/// `CryptoError::DecryptionFailed` on a wrong password or tampered vault.
pub fn decrypt_vault(password: &str, vault: &str) -> Result<Vec<u8>, CryptoError> {
    let envelope: VaultEnvelope =
        serde_json::from_str(vault).map_err(|e| CryptoError::MalformedVault(e.to_string()))?;
    if envelope.version != VAULT_VERSION {
        return Err(CryptoError::MalformedVault(format!(
            "unsupported version {}",
            envelope.version
        )));
    }

    let salt = hex::decode(&envelope.salt).map_err(|e| CryptoError::MalformedVault(e.to_string()))?;
    let nonce =
        hex::decode(&envelope.nonce).map_err(|e| CryptoError::MalformedVault(e.to_string()))?;
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::MalformedVault("bad nonce length".into()));
    }
    let data = hex::decode(&envelope.data).map_err(|e| CryptoError::MalformedVault(e.to_string()))?;

    let key = VaultKey::derive(password, &salt, envelope.kdf)?;
    key.cipher()
        .decrypt(XNonce::from_slice(&nonce), data.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed("incorrect password".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_round_trip() {
        let vault = encrypt_vault("hunter22", b"keyring payload", KdfParams::light()).unwrap();
        let plaintext = decrypt_vault("hunter22", &vault).unwrap();
        assert_eq!(plaintext, b"keyring payload");
    }

    #[test]
    fn test_wrong_password_fails() {
        let vault = encrypt_vault("correct", b"secret", KdfParams::light()).unwrap();
        assert!(matches!(
            decrypt_vault("incorrect", &vault),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_tampered_vault_fails() {
        let vault = encrypt_vault("pw", b"secret", KdfParams::light()).unwrap();
        let mut envelope: serde_json::Value = serde_json::from_str(&vault).unwrap();
        let data = envelope["data"].as_str().unwrap().to_string();
        let flipped = if data.starts_with('0') { format!("1{}", &data[1..]) } else { format!("0{}", &data[1..]) };
        envelope["data"] = serde_json::Value::String(flipped);

        assert!(decrypt_vault("pw", &envelope.to_string()).is_err());
    }

    #[test]
    fn test_salt_is_fresh_per_vault() {
        let a = encrypt_vault("pw", b"same", KdfParams::light()).unwrap();
        let b = encrypt_vault("pw", b"same", KdfParams::light()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decrypt_vault("pw", "not json"),
            Err(CryptoError::MalformedVault(_))
        ));
    }
}
