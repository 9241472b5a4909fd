//! # Transaction Controller
//!
//! Outgoing transactions go through an approval before they are filled,
//! signed and broadcast. Incoming transactions are pulled from a history
//! source for the selected account.
//!
//! ```text
//! add_transaction
//!   unapproved ──approval accepted──→ approved ──sign──→ signed ──send──→ submitted
//!        │                                 │
//!        └──approval rejected──→ rejected  └──any failure──→ failed
//! ```
//!
//! Other components follow network switches and new incoming blocks through
//! the transaction hub ([`TransactionHubEvent`]).

use crate::approval::AddApprovalRequest;
use crate::assets::contract::quantity_or_zero;
use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerAction, ControllerMessenger, ControllerName, StateSlice};
use crate::ports::{
    ChainIdSource, FlagSource, IncomingTransactionSource, Provider, ProviderSource, SelectedAddressSource,
    TransactionSigner,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{now_millis, Address, ApprovalType, ChainId, U256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

const HUB_CAPACITY: usize = 64;

/// Transaction fields as sent by dapps. Quantities are `0x` hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    pub from: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, alias = "gasLimit", skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Unapproved,
    Approved,
    Rejected,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    pub id: String,
    pub chain_id: ChainId,
    pub origin: String,
    pub status: TransactionStatus,
    pub time: u64,
    pub transaction: TransactionParams,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub is_incoming: bool,
}

impl TransactionMeta {
    #[must_use]
    pub fn new(chain_id: ChainId, origin: impl Into<String>, transaction: TransactionParams) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chain_id,
            origin: origin.into(),
            status: TransactionStatus::Unapproved,
            time: now_millis(),
            transaction,
            hash: None,
            error: None,
            block_number: None,
            is_incoming: false,
        }
    }
}

/// Transaction state slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionState {
    pub transactions: Vec<TransactionMeta>,
    pub method_data: BTreeMap<String, Value>,
    /// Next block to scan for incoming transactions, per `chain#account`.
    pub last_fetched_block_numbers: BTreeMap<String, u64>,
}

impl ControllerState for TransactionState {
    const NAME: ControllerName = ControllerName::Transaction;

    fn into_slice(self) -> StateSlice {
        StateSlice::Transaction(self)
    }
}

/// Notifications on the transaction hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionHubEvent {
    /// The selected network changed.
    NetworkChange(ChainId),
    /// Incoming transactions were found up to this block.
    IncomingTransactionBlock(u64),
}

/// Collaborators of the transaction controller.
pub struct TransactionSources {
    pub provider: ProviderSource,
    pub chain_id: ChainIdSource,
    pub selected_address: SelectedAddressSource,
    pub incoming: Arc<dyn IncomingTransactionSource>,
    pub show_incoming_transactions: FlagSource,
}

pub struct TransactionController {
    base: BaseController<TransactionState>,
    sources: TransactionSources,
    signer: RwLock<Option<Arc<dyn TransactionSigner>>>,
    hub: broadcast::Sender<TransactionHubEvent>,
}

impl TransactionController {
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        sources: TransactionSources,
        initial: TransactionState,
    ) -> Arc<Self> {
        let (hub, _) = broadcast::channel(HUB_CAPACITY);
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
            sources,
            signer: RwLock::new(None),
            hub,
        })
    }

    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.base.state()
    }

    /// Install the signer used for approved transactions.
    pub fn set_signer(&self, signer: Arc<dyn TransactionSigner>) {
        *self.signer.write() = Some(signer);
    }

    #[must_use]
    pub fn subscribe_hub(&self) -> broadcast::Receiver<TransactionHubEvent> {
        self.hub.subscribe()
    }

    /// Tell hub listeners the network changed.
    pub fn notify_network_change(&self, chain_id: ChainId) {
        let _ = self.hub.send(TransactionHubEvent::NetworkChange(chain_id));
    }

    #[must_use]
    pub fn transaction(&self, id: &str) -> Option<TransactionMeta> {
        self.base
            .read(|s| s.transactions.iter().find(|t| t.id == id).cloned())
    }

    /// Request approval for a transaction and broadcast it once approved.
    ///
    /// Returns the transaction hash.
    #[instrument(skip(self, params), fields(from = %params.from))]
    pub async fn add_transaction(&self, params: TransactionParams, origin: &str) -> ControllerResult<String> {
        if params.to.is_none() && params.data.as_deref().map_or(true, |d| d.len() <= 2) {
            return Err(ControllerError::InvalidParams(
                "transaction needs a recipient or contract data".into(),
            ));
        }
        let chain_id = (self.sources.chain_id)();
        let meta = TransactionMeta::new(chain_id, origin, params);
        let id = meta.id.clone();
        let request_data = json!({ "txId": id, "transaction": meta.transaction });
        self.base.update(|state| state.transactions.push(meta));

        let approval = self
            .base
            .messenger()
            .call(ControllerAction::AddApprovalRequest(
                AddApprovalRequest::new(origin, ApprovalType::Transaction, request_data)
                    .with_id(id.clone())
                    .expecting_result(),
            ))
            .await
            .and_then(|response| response.into_approval());
        let mut outcome = match approval {
            Ok(outcome) => outcome,
            Err(e) => {
                info!(id = %id, "Transaction rejected");
                self.set_status(&id, TransactionStatus::Rejected, None);
                return Err(e);
            }
        };
        self.set_status(&id, TransactionStatus::Approved, None);

        match self.approve_and_send(&id, chain_id).await {
            Ok(hash) => {
                outcome.report_success(json!(hash));
                Ok(hash)
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Transaction failed");
                self.set_status(&id, TransactionStatus::Failed, Some(e.to_string()));
                outcome.report_error(e.to_rpc_error());
                Err(e)
            }
        }
    }

    async fn approve_and_send(&self, id: &str, chain_id: ChainId) -> ControllerResult<String> {
        // The user approved for `chain_id`; never sign for or send to another one.
        let current = (self.sources.chain_id)();
        if current != chain_id {
            return Err(ControllerError::ChainChanged {
                expected: chain_id,
                actual: current,
            });
        }
        let provider = (self.sources.provider)().ok_or(ControllerError::NoProvider)?;
        let signer = self
            .signer
            .read()
            .clone()
            .ok_or_else(|| ControllerError::Config("no transaction signer".into()))?;
        let params = self
            .transaction(id)
            .ok_or_else(|| ControllerError::NotFound(format!("transaction {id}")))?
            .transaction;

        let filled = fill_transaction(provider.as_ref(), params).await?;
        let raw = signer.sign_transaction(&filled, chain_id).await?;
        self.base.update(|state| {
            if let Some(tx) = state.transactions.iter_mut().find(|t| t.id == id) {
                tx.transaction = filled;
                tx.status = TransactionStatus::Signed;
            }
        });

        let hash = provider
            .request("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw))]))
            .await?;
        let hash = hash
            .as_str()
            .ok_or(ControllerError::UnexpectedResponse("eth_sendRawTransaction"))?
            .to_string();
        self.base.update(|state| {
            if let Some(tx) = state.transactions.iter_mut().find(|t| t.id == id) {
                tx.status = TransactionStatus::Submitted;
                tx.hash = Some(hash.clone());
            }
        });
        info!(id, hash = %hash, "Transaction submitted");
        Ok(hash)
    }

    fn set_status(&self, id: &str, status: TransactionStatus, error: Option<String>) {
        self.base.update(|state| {
            if let Some(tx) = state.transactions.iter_mut().find(|t| t.id == id) {
                tx.status = status;
                tx.error = error;
            }
        });
    }

    /// Pull incoming transactions for the selected account.
    ///
    /// Returns how many new ones were recorded.
    pub async fn update_incoming_transactions(&self) -> ControllerResult<usize> {
        if !(self.sources.show_incoming_transactions)() {
            return Ok(0);
        }
        let Some(address) = (self.sources.selected_address)() else {
            return Ok(0);
        };
        let chain_id = (self.sources.chain_id)();
        let key = format!("{chain_id}#{address}");
        let from_block = self.base.read(|s| s.last_fetched_block_numbers.get(&key).copied());

        let fetched = self.sources.incoming.fetch(&address, chain_id, from_block).await?;
        let latest = fetched.iter().filter_map(|t| t.block_number).max();

        let added = self.base.update(|state| {
            let mut added = 0;
            for mut tx in fetched {
                let known = tx.hash.is_some()
                    && state.transactions.iter().any(|t| t.hash == tx.hash && t.chain_id == chain_id);
                if known {
                    continue;
                }
                tx.is_incoming = true;
                state.transactions.push(tx);
                added += 1;
            }
            if let Some(block) = latest {
                state.last_fetched_block_numbers.insert(key, block + 1);
            }
            added
        });

        if let Some(block) = latest.filter(|_| added > 0) {
            debug!(added, block, "Incoming transactions recorded");
            let _ = self.hub.send(TransactionHubEvent::IncomingTransactionBlock(block));
        }
        Ok(added)
    }

    /// Drop transactions of one chain, or all of them.
    pub fn wipe_transactions(&self, chain_id: Option<ChainId>) {
        self.base.update(|state| match chain_id {
            Some(chain) => state.transactions.retain(|t| t.chain_id != chain),
            None => state.transactions.clear(),
        });
    }

    /// Clear transactions, method data and fetched block numbers.
    pub fn reset(&self) {
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: TransactionState) {
        self.base.replace(next);
    }
}

/// Fill nonce, gas limit and fee fields the dapp left out.
async fn fill_transaction(provider: &dyn Provider, mut tx: TransactionParams) -> ControllerResult<TransactionParams> {
    if tx.nonce.is_none() {
        let nonce = provider
            .request("eth_getTransactionCount", json!([tx.from.as_str(), "pending"]))
            .await?;
        tx.nonce = Some(quantity_or_zero(&nonce));
    }
    if tx.gas.is_none() {
        let estimate = provider.request("eth_estimateGas", json!([tx])).await?;
        tx.gas = Some(quantity_or_zero(&estimate));
    }

    let has_fees = tx.gas_price.is_some() || (tx.max_fee_per_gas.is_some() && tx.max_priority_fee_per_gas.is_some());
    if !has_fees {
        let block = provider
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        match block.get("baseFeePerGas").filter(|v| !v.is_null()) {
            Some(base_fee) => {
                let tip = quantity_or_zero(&provider.request("eth_maxPriorityFeePerGas", json!([])).await?);
                tx.max_priority_fee_per_gas = Some(tip);
                tx.max_fee_per_gas = Some(quantity_or_zero(base_fee) * 2 + tip);
                tx.gas_price = None;
            }
            None => {
                tx.gas_price = Some(quantity_or_zero(&provider.request("eth_gasPrice", json!([])).await?));
            }
        }
    }
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{LocalProviderFactory, StaticIncomingTransactionSource};
    use crate::approval::{AcceptOptions, ApprovalConfig, ApprovalController};
    use crate::keyring::{KeyringController, KeyringHooks, KeyringState};
    use crate::messaging::{actions, ControllerBus};
    use crate::network::ProviderConfig;
    use crate::ports::ProviderFactory;
    use crate::test_support::{messenger_for, messenger_on};
    use shared_crypto::KdfParams;
    use shared_types::RpcError;

    struct Harness {
        _bus: Arc<ControllerBus>,
        approvals: Arc<ApprovalController>,
        transactions: Arc<TransactionController>,
        factory: Arc<LocalProviderFactory>,
        chain: Arc<RwLock<ChainId>>,
        from: Address,
    }

    fn harness(incoming: StaticIncomingTransactionSource) -> Harness {
        let (bus, approval_messenger) = messenger_for(ControllerName::Approval, &[], &[]);
        let approvals = ApprovalController::new(approval_messenger, ApprovalConfig::default()).unwrap();
        let keyring = KeyringController::new(
            messenger_on(&bus, ControllerName::Keyring, &[], &[]),
            KeyringHooks::default(),
            KdfParams::light(),
            KeyringState::default(),
        )
        .unwrap();
        let from = keyring.create_new_vault_and_keychain("pw").unwrap();

        let factory = Arc::new(LocalProviderFactory::default());
        let chain = Arc::new(RwLock::new(ChainId::MAINNET));
        let selected = from.clone();
        let provider_factory = Arc::clone(&factory);
        let provider_chain = Arc::clone(&chain);
        let active_chain = Arc::clone(&chain);
        let transactions = TransactionController::new(
            messenger_on(&bus, ControllerName::Transaction, &[actions::APPROVAL_ADD_REQUEST], &[]),
            TransactionSources {
                provider: Arc::new(move || {
                    let config = ProviderConfig {
                        chain_id: *provider_chain.read(),
                        ..ProviderConfig::default()
                    };
                    provider_factory.create(&config).ok()
                }),
                chain_id: Arc::new(move || *active_chain.read()),
                selected_address: Arc::new(move || Some(selected.clone())),
                incoming: Arc::new(incoming),
                show_incoming_transactions: Arc::new(|| true),
            },
            TransactionState::default(),
        );
        transactions.set_signer(keyring);
        Harness {
            _bus: bus,
            approvals,
            transactions,
            factory,
            chain,
            from,
        }
    }

    fn transfer(from: &Address) -> TransactionParams {
        TransactionParams {
            from: from.clone(),
            to: Some(Address::from_bytes([0x22; 20])),
            value: Some(U256::from(1_000u64)),
            ..TransactionParams::default()
        }
    }

    async fn next_approval_id(approvals: &ApprovalController) -> String {
        loop {
            if let Some(id) = approvals.state().pending_approvals.keys().next().cloned() {
                return id;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_approved_transaction_is_broadcast() {
        // Arrange
        let h = harness(StaticIncomingTransactionSource::default());
        let sender = {
            let transactions = h.transactions.clone();
            let params = transfer(&h.from);
            tokio::spawn(async move { transactions.add_transaction(params, "dapp.io").await })
        };

        // Act
        let id = next_approval_id(&h.approvals).await;
        let options = AcceptOptions {
            wait_for_result: true,
            delete_after_result: true,
        };
        let accepted = h.approvals.accept(&id, None, options).await.unwrap();

        // Assert
        let hash = sender.await.unwrap().unwrap();
        assert_eq!(accepted.value, Some(json!(hash)));
        assert_eq!(h.factory.chain(ChainId::MAINNET).sent_transactions().len(), 1);
        let meta = h.transactions.transaction(&id).unwrap();
        assert_eq!(meta.status, TransactionStatus::Submitted);
        assert!(meta.transaction.max_fee_per_gas.is_some());
    }

    #[tokio::test]
    async fn test_rejected_transaction_is_not_sent() {
        let h = harness(StaticIncomingTransactionSource::default());
        let sender = {
            let transactions = h.transactions.clone();
            let params = transfer(&h.from);
            tokio::spawn(async move { transactions.add_transaction(params, "dapp.io").await })
        };

        let id = next_approval_id(&h.approvals).await;
        h.approvals.reject(&id, RpcError::user_rejected_request()).unwrap();

        assert!(sender.await.unwrap().is_err());
        assert!(h.factory.chain(ChainId::MAINNET).sent_transactions().is_empty());
        assert_eq!(h.transactions.transaction(&id).unwrap().status, TransactionStatus::Rejected);
    }

    #[tokio::test]
    async fn test_network_switch_during_approval_blocks_the_send() {
        // Arrange
        let h = harness(StaticIncomingTransactionSource::default());
        let sender = {
            let transactions = h.transactions.clone();
            let params = transfer(&h.from);
            tokio::spawn(async move { transactions.add_transaction(params, "dapp.io").await })
        };
        let id = next_approval_id(&h.approvals).await;

        // Act
        *h.chain.write() = ChainId::SEPOLIA;
        let options = AcceptOptions {
            wait_for_result: true,
            delete_after_result: true,
        };
        let accepted = h.approvals.accept(&id, None, options).await;

        // Assert
        let result = sender.await.unwrap();
        assert!(matches!(
            result,
            Err(ControllerError::ChainChanged {
                expected: ChainId::MAINNET,
                actual: ChainId::SEPOLIA,
            })
        ));
        assert!(accepted.is_err());
        assert!(h.factory.chain(ChainId::MAINNET).sent_transactions().is_empty());
        assert!(h.factory.chain(ChainId::SEPOLIA).sent_transactions().is_empty());
        let meta = h.transactions.transaction(&id).unwrap();
        assert_eq!(meta.status, TransactionStatus::Failed);
        assert!(meta.hash.is_none());
    }

    #[tokio::test]
    async fn test_incoming_transactions_advance_block_and_notify_hub() {
        let mut incoming = TransactionMeta::new(ChainId::MAINNET, "incoming", transfer(&Address::from_bytes([9; 20])));
        incoming.hash = Some("0xabc".into());
        incoming.block_number = Some(41);
        incoming.status = TransactionStatus::Confirmed;
        let h = harness(StaticIncomingTransactionSource::default().with_transactions(vec![incoming]));
        let mut hub = h.transactions.subscribe_hub();

        assert_eq!(h.transactions.update_incoming_transactions().await.unwrap(), 1);
        assert_eq!(h.transactions.update_incoming_transactions().await.unwrap(), 0);

        assert_eq!(hub.try_recv().unwrap(), TransactionHubEvent::IncomingTransactionBlock(41));
        let state = h.transactions.state();
        assert!(state.transactions[0].is_incoming);
        assert_eq!(state.last_fetched_block_numbers.values().next(), Some(&42));
    }

    #[test]
    fn test_params_accept_gas_limit_alias() {
        let params: TransactionParams = serde_json::from_value(json!({
            "from": "0x0000000000000000000000000000000000000001",
            "to": "0x0000000000000000000000000000000000000002",
            "gasLimit": "0x5208",
            "value": "0x1"
        }))
        .unwrap();
        assert_eq!(params.gas, Some(U256::from(21_000u64)));
    }
}
