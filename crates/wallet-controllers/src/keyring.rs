//! # Keyring Controller
//!
//! Holds the account keys, encrypted at rest in a password-protected vault.
//!
//! ## Lifecycle
//!
//! ```text
//! (no vault) ──create_new_vault_and_keychain──→ unlocked
//! locked ──submit_password──→ unlocked ──set_locked──→ locked
//! ```
//!
//! Every key change re-encrypts the vault and publishes a new state, which
//! the engine uses to back the vault up. Keys only exist in memory while the
//! keyring is unlocked.
//!
//! ## Signing
//!
//! | Method | Digest |
//! |--------|--------|
//! | `eth_sign` | the 32-byte message itself |
//! | `personal_sign` | EIP-191 personal message hash |
//! | `eth_signTypedData_v3/_v4` | EIP-712 hash |
//! | transactions | EIP-155 legacy or EIP-1559 (type 2) RLP payload |

use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult, KeyringError};
use crate::messaging::{
    actions, ActionResponse, ControllerAction, ControllerEvent, ControllerMessenger, ControllerName,
    StateSlice,
};
use crate::ports::TransactionSigner;
use crate::transaction::TransactionParams;
use async_trait::async_trait;
use parking_lot::RwLock;
use rlp::RlpStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_bus::{ActionHandler, BusAction};
use shared_crypto::{
    decrypt_vault, encrypt_vault, hash_typed_data, keccak256, personal_message_hash, EthKeyPair,
    KdfParams, RecoverableSignature, TypedData, TypedDataVersion,
};
use shared_types::{Address, ChainId, U256};
use std::sync::{Arc, Weak};
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyringType {
    #[serde(rename = "Generated Key Pair")]
    Generated,
    #[serde(rename = "Simple Key Pair")]
    Imported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringSummary {
    #[serde(rename = "type")]
    pub keyring_type: KeyringType,
    pub accounts: Vec<Address>,
}

/// Keyring state slice. `vault` is the encrypted key store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringState {
    pub is_unlocked: bool,
    pub keyrings: Vec<KeyringSummary>,
    pub vault: Option<String>,
}

impl KeyringState {
    /// Every account, in keyring order.
    #[must_use]
    pub fn accounts(&self) -> Vec<Address> {
        self.keyrings.iter().flat_map(|k| k.accounts.clone()).collect()
    }
}

impl ControllerState for KeyringState {
    const NAME: ControllerName = ControllerName::Keyring;

    fn into_slice(self) -> StateSlice {
        StateSlice::Keyring(self)
    }
}

/// Preferences updates driven by account changes.
#[derive(Clone)]
pub struct KeyringHooks {
    pub update_identities: Arc<dyn Fn(&[Address]) + Send + Sync>,
    pub set_selected_address: Arc<dyn Fn(&Address) + Send + Sync>,
    pub remove_identity: Arc<dyn Fn(&Address) + Send + Sync>,
}

impl Default for KeyringHooks {
    fn default() -> Self {
        Self {
            update_identities: Arc::new(|_: &[Address]| {}),
            set_selected_address: Arc::new(|_: &Address| {}),
            remove_identity: Arc::new(|_: &Address| {}),
        }
    }
}

/// Plaintext vault entry.
#[derive(Serialize, Deserialize)]
struct SerializedKey {
    #[serde(rename = "type")]
    keyring_type: KeyringType,
    key: String,
}

struct StoredKey {
    keyring_type: KeyringType,
    pair: EthKeyPair,
}

struct Unlocked {
    password: Zeroizing<String>,
    keys: Vec<StoredKey>,
}

pub struct KeyringController {
    base: BaseController<KeyringState>,
    unlocked: RwLock<Option<Unlocked>>,
    hooks: KeyringHooks,
    kdf: KdfParams,
}

impl KeyringController {
    /// Create the controller and register its bus actions.
    ///
    /// A vault in `initial` starts locked.
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        hooks: KeyringHooks,
        kdf: KdfParams,
        initial: KeyringState,
    ) -> ControllerResult<Arc<Self>> {
        let initial = KeyringState {
            is_unlocked: false,
            ..initial
        };
        let controller = Arc::new(Self {
            base: BaseController::new(Arc::clone(&messenger), initial),
            unlocked: RwLock::new(None),
            hooks,
            kdf,
        });

        let handler: Arc<dyn ActionHandler<ControllerAction>> = Arc::new(KeyringActions {
            controller: Arc::downgrade(&controller),
        });
        for action in [
            actions::KEYRING_GET_STATE,
            actions::KEYRING_SIGN_MESSAGE,
            actions::KEYRING_SIGN_PERSONAL_MESSAGE,
            actions::KEYRING_SIGN_TYPED_MESSAGE,
        ] {
            messenger.register_action_handler(action, Arc::clone(&handler))?;
        }
        Ok(controller)
    }

    #[must_use]
    pub fn state(&self) -> KeyringState {
        self.base.state()
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.unlocked.read().is_some()
    }

    #[must_use]
    pub fn accounts(&self) -> Vec<Address> {
        self.base.read(KeyringState::accounts)
    }

    /// Replace any existing keys with a fresh vault holding one new account.
    #[instrument(skip_all)]
    pub fn create_new_vault_and_keychain(&self, password: &str) -> ControllerResult<Address> {
        if password.is_empty() {
            return Err(KeyringError::InvalidRequest("password must not be empty".into()).into());
        }
        let pair = EthKeyPair::generate();
        let address = pair.address().clone();
        *self.unlocked.write() = Some(Unlocked {
            password: Zeroizing::new(password.to_string()),
            keys: vec![StoredKey {
                keyring_type: KeyringType::Generated,
                pair,
            }],
        });
        self.persist()?;
        self.sync_identities();
        (self.hooks.set_selected_address)(&address);
        self.publish(ControllerEvent::KeyringUnlocked);
        info!(account = %address, "New vault created");
        Ok(address)
    }

    /// Generate another account.
    pub fn add_new_account(&self) -> ControllerResult<Address> {
        let address = self.insert_key(KeyringType::Generated, EthKeyPair::generate())?;
        self.sync_identities();
        Ok(address)
    }

    /// Import an account from a hex private key and select it.
    pub fn import_account_with_private_key(&self, private_key: &str) -> ControllerResult<Address> {
        let pair = EthKeyPair::from_hex(private_key)
            .map_err(|e| KeyringError::InvalidRequest(e.to_string()))?;
        let address = self.insert_key(KeyringType::Imported, pair)?;
        self.sync_identities();
        (self.hooks.set_selected_address)(&address);
        Ok(address)
    }

    fn insert_key(&self, keyring_type: KeyringType, pair: EthKeyPair) -> ControllerResult<Address> {
        let address = pair.address().clone();
        {
            let mut guard = self.unlocked.write();
            let unlocked = guard.as_mut().ok_or(KeyringError::Locked)?;
            if unlocked.keys.iter().any(|k| k.pair.address() == &address) {
                return Err(KeyringError::DuplicateAccount(address).into());
            }
            unlocked.keys.push(StoredKey { keyring_type, pair });
        }
        self.persist()?;
        Ok(address)
    }

    /// Remove an account and its key.
    pub fn remove_account(&self, address: &Address) -> ControllerResult<()> {
        {
            let mut guard = self.unlocked.write();
            let unlocked = guard.as_mut().ok_or(KeyringError::Locked)?;
            let before = unlocked.keys.len();
            unlocked.keys.retain(|k| k.pair.address() != address);
            if unlocked.keys.len() == before {
                return Err(KeyringError::UnknownAccount(address.clone()).into());
            }
        }
        self.persist()?;
        (self.hooks.remove_identity)(address);
        self.publish(ControllerEvent::KeyringAccountRemoved(address.clone()));
        info!(account = %address, "Account removed");
        Ok(())
    }

    /// Decrypt the vault and unlock.
    #[instrument(skip_all)]
    pub fn submit_password(&self, password: &str) -> ControllerResult<()> {
        let keys = self.decrypt(password)?;
        *self.unlocked.write() = Some(Unlocked {
            password: Zeroizing::new(password.to_string()),
            keys,
        });
        self.base.update(|state| state.is_unlocked = true);
        self.sync_identities();
        self.publish(ControllerEvent::KeyringUnlocked);
        info!("Keyring unlocked");
        Ok(())
    }

    /// Drop the keys from memory.
    pub fn set_locked(&self) {
        self.unlocked.write().take();
        self.base.update(|state| state.is_unlocked = false);
        self.publish(ControllerEvent::KeyringLocked);
        info!("Keyring locked");
    }

    pub fn verify_password(&self, password: &str) -> ControllerResult<()> {
        self.decrypt(password).map(|_| ())
    }

    /// Private key of `address` as hex. Requires the password.
    pub fn export_account(&self, password: &str, address: &Address) -> ControllerResult<Zeroizing<String>> {
        self.verify_password(password)?;
        self.with_key(address, |pair| Ok(Zeroizing::new(pair.to_hex())))
    }

    /// `eth_sign`: sign a raw 32-byte digest.
    pub fn sign_message(&self, from: &Address, data: &str) -> ControllerResult<String> {
        let bytes = decode_hex(data)?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyringError::InvalidRequest("eth_sign expects a 32-byte hash".into()))?;
        self.sign_digest(from, &digest)
    }

    /// `personal_sign`. Hex input is signed as bytes, anything else as UTF-8.
    pub fn sign_personal_message(&self, from: &Address, data: &str) -> ControllerResult<String> {
        let message = match data.strip_prefix("0x").map(hex::decode) {
            Some(Ok(bytes)) => bytes,
            _ => data.as_bytes().to_vec(),
        };
        self.sign_digest(from, &personal_message_hash(&message))
    }

    /// `eth_signTypedData_v3` / `_v4`.
    pub fn sign_typed_message(
        &self,
        from: &Address,
        data: &Value,
        version: TypedDataVersion,
    ) -> ControllerResult<String> {
        let typed = TypedData::from_value(data).map_err(|e| KeyringError::InvalidRequest(e.to_string()))?;
        let digest = hash_typed_data(&typed, version).map_err(|e| KeyringError::InvalidRequest(e.to_string()))?;
        self.sign_digest(from, &digest)
    }

    /// Raw signed transaction bytes.
    pub fn sign_transaction_sync(&self, tx: &TransactionParams, chain_id: ChainId) -> ControllerResult<Vec<u8>> {
        let nonce = tx.nonce.unwrap_or_default();
        let gas = tx
            .gas
            .ok_or_else(|| KeyringError::InvalidRequest("missing gas limit".into()))?;
        let value = tx.value.unwrap_or_default();
        let data = match &tx.data {
            Some(d) => decode_hex(d)?,
            None => Vec::new(),
        };

        let append_body = |stream: &mut RlpStream| {
            stream.append(&gas);
            match &tx.to {
                Some(to) => stream.append(&to.to_bytes().to_vec()),
                None => stream.append_empty_data(),
            };
            stream.append(&value);
            stream.append(&data);
        };

        if let (Some(max_fee), Some(priority)) = (tx.max_fee_per_gas, tx.max_priority_fee_per_gas) {
            let fields = |stream: &mut RlpStream| {
                stream.append(&chain_id.0);
                stream.append(&nonce);
                stream.append(&priority);
                stream.append(&max_fee);
                append_body(stream);
                stream.begin_list(0);
            };
            let mut unsigned = RlpStream::new_list(9);
            fields(&mut unsigned);
            let digest = keccak256(&typed_payload(&unsigned.out()));
            let signature = self.with_key(&tx.from, |pair| sign(pair, &digest))?;

            let mut signed = RlpStream::new_list(12);
            fields(&mut signed);
            signed.append(&signature.recovery_id);
            signed.append(&U256::from_big_endian(&signature.r));
            signed.append(&U256::from_big_endian(&signature.s));
            return Ok(typed_payload(&signed.out()));
        }

        let gas_price = tx
            .gas_price
            .ok_or_else(|| KeyringError::InvalidRequest("missing gas price".into()))?;
        let mut unsigned = RlpStream::new_list(9);
        unsigned.append(&nonce);
        unsigned.append(&gas_price);
        append_body(&mut unsigned);
        unsigned.append(&chain_id.0);
        unsigned.append(&0u8);
        unsigned.append(&0u8);
        let digest = keccak256(&unsigned.out());
        let signature = self.with_key(&tx.from, |pair| sign(pair, &digest))?;

        let mut signed = RlpStream::new_list(9);
        signed.append(&nonce);
        signed.append(&gas_price);
        append_body(&mut signed);
        signed.append(&(u64::from(signature.recovery_id) + 35 + chain_id.0 * 2));
        signed.append(&U256::from_big_endian(&signature.r));
        signed.append(&U256::from_big_endian(&signature.s));
        Ok(signed.out().to_vec())
    }

    fn sign_digest(&self, from: &Address, digest: &[u8; 32]) -> ControllerResult<String> {
        self.with_key(from, |pair| sign(pair, digest).map(|s| s.to_rpc_hex()))
    }

    fn with_key<R>(
        &self,
        address: &Address,
        f: impl FnOnce(&EthKeyPair) -> ControllerResult<R>,
    ) -> ControllerResult<R> {
        let guard = self.unlocked.read();
        let unlocked = guard.as_ref().ok_or(KeyringError::Locked)?;
        let key = unlocked
            .keys
            .iter()
            .find(|k| k.pair.address() == address)
            .ok_or_else(|| KeyringError::UnknownAccount(address.clone()))?;
        f(&key.pair)
    }

    fn decrypt(&self, password: &str) -> ControllerResult<Vec<StoredKey>> {
        let vault = self.base.read(|s| s.vault.clone()).ok_or(KeyringError::NoVault)?;
        let plaintext = Zeroizing::new(
            decrypt_vault(password, &vault).map_err(|_| KeyringError::IncorrectPassword)?,
        );
        let serialized: Vec<SerializedKey> =
            serde_json::from_slice(&plaintext).map_err(|e| KeyringError::Crypto(e.to_string()))?;
        serialized
            .into_iter()
            .map(|entry| {
                let key = Zeroizing::new(entry.key);
                EthKeyPair::from_hex(&key)
                    .map(|pair| StoredKey {
                        keyring_type: entry.keyring_type,
                        pair,
                    })
                    .map_err(|e| KeyringError::Crypto(e.to_string()).into())
            })
            .collect()
    }

    /// Re-encrypt the vault and publish the key layout.
    fn persist(&self) -> ControllerResult<()> {
        let (vault, keyrings) = {
            let guard = self.unlocked.read();
            let unlocked = guard.as_ref().ok_or(KeyringError::Locked)?;
            let serialized: Vec<SerializedKey> = unlocked
                .keys
                .iter()
                .map(|k| SerializedKey {
                    keyring_type: k.keyring_type,
                    key: k.pair.to_hex(),
                })
                .collect();
            let plaintext = Zeroizing::new(
                serde_json::to_vec(&serialized).map_err(|e| KeyringError::Crypto(e.to_string()))?,
            );
            let vault = encrypt_vault(&unlocked.password, &plaintext, self.kdf)
                .map_err(|e| KeyringError::Crypto(e.to_string()))?;
            (vault, summarize(&unlocked.keys))
        };
        self.base.update(|state| {
            state.vault = Some(vault);
            state.keyrings = keyrings;
            state.is_unlocked = true;
        });
        Ok(())
    }

    fn sync_identities(&self) {
        let accounts = self.accounts();
        (self.hooks.update_identities)(&accounts);
    }

    fn publish(&self, event: ControllerEvent) {
        if let Err(e) = self.base.messenger().publish(event) {
            warn!(error = %e, "Keyring event not published");
        }
    }

    /// Forget the vault entirely.
    pub fn clear(&self) {
        self.unlocked.write().take();
        self.base.reset();
    }
}

#[async_trait]
impl TransactionSigner for KeyringController {
    async fn sign_transaction(&self, tx: &TransactionParams, chain_id: ChainId) -> Result<Vec<u8>, ControllerError> {
        self.sign_transaction_sync(tx, chain_id)
    }
}

fn sign(pair: &EthKeyPair, digest: &[u8; 32]) -> ControllerResult<RecoverableSignature> {
    pair.sign_hash(digest)
        .map_err(|e| KeyringError::Crypto(e.to_string()).into())
}

fn typed_payload(body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(body.len() + 1);
    payload.push(0x02);
    payload.extend_from_slice(body);
    payload
}

fn summarize(keys: &[StoredKey]) -> Vec<KeyringSummary> {
    let mut summaries: Vec<KeyringSummary> = Vec::new();
    for key in keys {
        let address = key.pair.address().clone();
        match summaries.iter_mut().find(|s| s.keyring_type == key.keyring_type) {
            Some(summary) => summary.accounts.push(address),
            None => summaries.push(KeyringSummary {
                keyring_type: key.keyring_type,
                accounts: vec![address],
            }),
        }
    }
    summaries
}

fn decode_hex(data: &str) -> ControllerResult<Vec<u8>> {
    hex::decode(data.trim_start_matches("0x"))
        .map_err(|_| KeyringError::InvalidRequest(format!("not hex: {data}")).into())
}

struct KeyringActions {
    controller: Weak<KeyringController>,
}

#[async_trait]
impl ActionHandler<ControllerAction> for KeyringActions {
    async fn handle(&self, action: ControllerAction) -> Result<ActionResponse, ControllerError> {
        let controller = self
            .controller
            .upgrade()
            .ok_or_else(|| ControllerError::NotFound(ControllerName::Keyring.as_str().into()))?;
        match action {
            ControllerAction::GetKeyringState => Ok(ActionResponse::KeyringState(controller.state())),
            ControllerAction::SignMessage { from, data } => {
                controller.sign_message(&from, &data).map(ActionResponse::Signature)
            }
            ControllerAction::SignPersonalMessage { from, data } => controller
                .sign_personal_message(&from, &data)
                .map(ActionResponse::Signature),
            ControllerAction::SignTypedMessage { from, data, version } => controller
                .sign_typed_message(&from, &data, version)
                .map(ActionResponse::Signature),
            other => Err(ControllerError::UnexpectedResponse(other.action_type())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::events;
    use crate::test_support::messenger_for;
    use shared_crypto::recover_address;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn keyring() -> (Arc<crate::messaging::ControllerBus>, Arc<KeyringController>) {
        let (bus, messenger) = messenger_for(ControllerName::Keyring, &[], &[]);
        let keyring =
            KeyringController::new(messenger, KeyringHooks::default(), KdfParams::light(), KeyringState::default())
                .unwrap();
        (bus, keyring)
    }

    #[test]
    fn test_wrong_password_fails_unlock() {
        // Arrange
        let (_bus, keyring) = keyring();
        let account = keyring.create_new_vault_and_keychain("correct horse").unwrap();
        keyring.set_locked();

        // Act
        let wrong = keyring.submit_password("battery staple");

        // Assert
        assert!(matches!(
            wrong,
            Err(ControllerError::Keyring(KeyringError::IncorrectPassword))
        ));
        assert!(!keyring.is_unlocked());
        keyring.submit_password("correct horse").unwrap();
        assert_eq!(keyring.accounts(), vec![account]);
    }

    #[test]
    fn test_vault_does_not_contain_plain_key() {
        let (_bus, keyring) = keyring();
        keyring.create_new_vault_and_keychain("pw").unwrap();
        let imported = keyring.import_account_with_private_key(KEY).unwrap();

        let vault = keyring.state().vault.unwrap();
        assert!(!vault.contains(KEY));
        assert_eq!(keyring.accounts().len(), 2);
        assert_eq!(
            keyring.export_account("pw", &imported).unwrap().as_str(),
            KEY
        );
    }

    #[test]
    fn test_duplicate_import_refused() {
        let (_bus, keyring) = keyring();
        keyring.create_new_vault_and_keychain("pw").unwrap();
        keyring.import_account_with_private_key(KEY).unwrap();
        assert!(matches!(
            keyring.import_account_with_private_key(KEY),
            Err(ControllerError::Keyring(KeyringError::DuplicateAccount(_)))
        ));
    }

    #[test]
    fn test_personal_sign_recovers_signer() {
        let (_bus, keyring) = keyring();
        let account = keyring.create_new_vault_and_keychain("pw").unwrap();

        let signature = keyring.sign_personal_message(&account, "0x68656c6c6f").unwrap();

        let parsed = RecoverableSignature::from_rpc_hex(&signature).unwrap();
        let recovered = recover_address(&personal_message_hash(b"hello"), &parsed).unwrap();
        assert_eq!(recovered, account);
    }

    #[test]
    fn test_locked_keyring_refuses_to_sign() {
        let (_bus, keyring) = keyring();
        let account = keyring.create_new_vault_and_keychain("pw").unwrap();
        keyring.set_locked();
        assert!(matches!(
            keyring.sign_personal_message(&account, "hi"),
            Err(ControllerError::Keyring(KeyringError::Locked))
        ));
    }

    #[test]
    fn test_sign_transaction_legacy_and_fee_market() {
        let (_bus, keyring) = keyring();
        keyring.create_new_vault_and_keychain("pw").unwrap();
        let from = keyring.import_account_with_private_key(KEY).unwrap();
        let mut tx = TransactionParams {
            from,
            to: Some(Address::from_bytes([0x22; 20])),
            value: Some(U256::from(1_000u64)),
            gas: Some(U256::from(21_000u64)),
            gas_price: Some(U256::from(20_000_000_000u64)),
            nonce: Some(U256::zero()),
            ..TransactionParams::default()
        };

        let legacy = keyring.sign_transaction_sync(&tx, ChainId::MAINNET).unwrap();
        assert!(legacy[0] >= 0xc0);

        tx.gas_price = None;
        tx.max_fee_per_gas = Some(U256::from(30_000_000_000u64));
        tx.max_priority_fee_per_gas = Some(U256::from(1_000_000_000u64));
        let typed = keyring.sign_transaction_sync(&tx, ChainId::MAINNET).unwrap();
        assert_eq!(typed[0], 0x02);
    }

    #[test]
    fn test_remove_account_publishes_event() {
        let (bus, keyring) = keyring();
        keyring.create_new_vault_and_keychain("pw").unwrap();
        let imported = keyring.import_account_with_private_key(KEY).unwrap();
        let removed = Arc::new(AtomicUsize::new(0));
        let counter = removed.clone();
        bus.subscribe(
            events::KEYRING_ACCOUNT_REMOVED,
            Arc::new(move |_event: &ControllerEvent| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        keyring.remove_account(&imported).unwrap();

        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert_eq!(keyring.accounts().len(), 1);
    }

    #[tokio::test]
    async fn test_sign_through_bus() {
        let (bus, keyring) = keyring();
        let account = keyring.create_new_vault_and_keychain("pw").unwrap();
        let signature = bus
            .call(ControllerAction::SignMessage {
                from: account,
                data: format!("0x{}", "11".repeat(32)),
            })
            .await
            .unwrap()
            .into_signature()
            .unwrap();
        assert_eq!(signature.len(), 132);
    }
}
