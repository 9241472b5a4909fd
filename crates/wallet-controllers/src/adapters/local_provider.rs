//! In-memory chain used by tests and the dev binary.
//!
//! Answers the subset of JSON-RPC the controllers issue. Balances, token
//! balances and gas values are seeded through [`LocalChain`].

use crate::errors::ControllerError;
use crate::network::ProviderConfig;
use crate::ports::{Provider, ProviderFactory};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use shared_crypto::keccak256;
use shared_types::{to_quantity, Address, ChainId, RpcError, U256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// `balanceOf(address)`
pub const BALANCE_OF_SELECTOR: &str = "70a08231";
/// `decimals()`
pub const DECIMALS_SELECTOR: &str = "313ce567";

const ONE_GWEI: u64 = 1_000_000_000;

/// Mutable state of one simulated chain.
pub struct LocalChain {
    chain_id: ChainId,
    block_number: AtomicU64,
    eip1559: AtomicBool,
    offline: AtomicBool,
    gas_price: RwLock<U256>,
    balances: RwLock<HashMap<Address, U256>>,
    nonces: RwLock<HashMap<Address, u64>>,
    token_balances: RwLock<HashMap<(Address, Address), U256>>,
    token_decimals: RwLock<HashMap<Address, u8>>,
    sent: RwLock<Vec<String>>,
}

impl LocalChain {
    #[must_use]
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            block_number: AtomicU64::new(1),
            eip1559: AtomicBool::new(true),
            offline: AtomicBool::new(false),
            gas_price: RwLock::new(U256::from(20 * ONE_GWEI)),
            balances: RwLock::new(HashMap::new()),
            nonces: RwLock::new(HashMap::new()),
            token_balances: RwLock::new(HashMap::new()),
            token_decimals: RwLock::new(HashMap::new()),
            sent: RwLock::new(Vec::new()),
        }
    }

    pub fn set_balance(&self, address: &Address, wei: U256) {
        self.balances.write().insert(address.clone(), wei);
    }

    pub fn set_nonce(&self, address: &Address, nonce: u64) {
        self.nonces.write().insert(address.clone(), nonce);
    }

    pub fn set_token_balance(&self, token: &Address, owner: &Address, amount: U256) {
        self.token_balances
            .write()
            .insert((token.clone(), owner.clone()), amount);
    }

    pub fn set_token_decimals(&self, token: &Address, decimals: u8) {
        self.token_decimals.write().insert(token.clone(), decimals);
    }

    pub fn set_eip1559(&self, enabled: bool) {
        self.eip1559.store(enabled, Ordering::SeqCst);
    }

    /// Make every request fail.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn mine(&self, blocks: u64) {
        self.block_number.fetch_add(blocks, Ordering::SeqCst);
    }

    /// Raw transactions received through `eth_sendRawTransaction`.
    #[must_use]
    pub fn sent_transactions(&self) -> Vec<String> {
        self.sent.read().clone()
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RpcError::internal("network unreachable"));
        }
        let block = self.block_number.load(Ordering::SeqCst);
        match method {
            "eth_chainId" => Ok(json!(self.chain_id.to_hex())),
            "net_version" => Ok(json!(self.chain_id.network_id())),
            "eth_blockNumber" => Ok(json!(to_quantity(U256::from(block)))),
            "eth_gasPrice" => Ok(json!(to_quantity(*self.gas_price.read()))),
            "eth_maxPriorityFeePerGas" => Ok(json!(to_quantity(U256::from(ONE_GWEI)))),
            "eth_getBalance" => {
                let address = address_param(params, 0)?;
                let balance = self.balances.read().get(&address).copied().unwrap_or_default();
                Ok(json!(to_quantity(balance)))
            }
            "eth_getTransactionCount" => {
                let address = address_param(params, 0)?;
                let nonce = self.nonces.read().get(&address).copied().unwrap_or_default();
                Ok(json!(to_quantity(U256::from(nonce))))
            }
            "eth_estimateGas" => {
                let has_data = params
                    .get(0)
                    .and_then(|tx| tx.get("data"))
                    .and_then(Value::as_str)
                    .is_some_and(|d| d.len() > 2);
                let gas: u64 = if has_data { 100_000 } else { 21_000 };
                Ok(json!(to_quantity(U256::from(gas))))
            }
            "eth_getBlockByNumber" => {
                let base_fee = if self.eip1559.load(Ordering::SeqCst) {
                    json!(to_quantity(U256::from(10 * ONE_GWEI)))
                } else {
                    Value::Null
                };
                Ok(json!({
                    "number": to_quantity(U256::from(block)),
                    "baseFeePerGas": base_fee,
                    "gasLimit": to_quantity(U256::from(30_000_000u64)),
                }))
            }
            "eth_sendRawTransaction" => {
                let raw = params
                    .get(0)
                    .and_then(Value::as_str)
                    .ok_or_else(|| RpcError::invalid_params("missing raw transaction"))?;
                let bytes = hex::decode(raw.trim_start_matches("0x"))
                    .map_err(|_| RpcError::invalid_params("raw transaction is not hex"))?;
                self.sent.write().push(raw.to_string());
                self.block_number.fetch_add(1, Ordering::SeqCst);
                Ok(json!(format!("0x{}", hex::encode(keccak256(&bytes)))))
            }
            "eth_call" => self.call(params),
            other => Err(RpcError::method_not_found(other)),
        }
    }

    fn call(&self, params: &Value) -> Result<Value, RpcError> {
        let tx = params
            .get(0)
            .ok_or_else(|| RpcError::invalid_params("missing call object"))?;
        let to = tx
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("missing to"))
            .and_then(|s| Address::parse(s).map_err(|e| RpcError::invalid_params(e.to_string())))?;
        let data = tx
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim_start_matches("0x");

        let word = if let Some(arg) = data.strip_prefix(BALANCE_OF_SELECTOR) {
            let owner = Address::parse(&format!("0x{}", &arg[arg.len().saturating_sub(40)..]))
                .map_err(|e| RpcError::invalid_params(e.to_string()))?;
            self.token_balances
                .read()
                .get(&(to, owner))
                .copied()
                .unwrap_or_default()
        } else if data.starts_with(DECIMALS_SELECTOR) {
            U256::from(self.token_decimals.read().get(&to).copied().unwrap_or(18))
        } else {
            return Err(RpcError::generic("execution reverted"));
        };
        let mut buf = [0u8; 32];
        word.to_big_endian(&mut buf);
        Ok(json!(format!("0x{}", hex::encode(buf))))
    }
}

fn address_param(params: &Value, index: usize) -> Result<Address, RpcError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params("missing address"))
        .and_then(|s| Address::parse(s).map_err(|e| RpcError::invalid_params(e.to_string())))
}

/// Provider over a [`LocalChain`].
pub struct LocalProvider {
    chain: Arc<LocalChain>,
}

impl LocalProvider {
    #[must_use]
    pub fn new(chain: Arc<LocalChain>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Provider for LocalProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.chain.handle(method, &params)
    }

    fn chain_id(&self) -> ChainId {
        self.chain.chain_id
    }
}

/// Hands out one [`LocalChain`] per chain id.
#[derive(Default)]
pub struct LocalProviderFactory {
    chains: RwLock<HashMap<ChainId, Arc<LocalChain>>>,
}

impl LocalProviderFactory {
    /// Chain for `chain_id`, created on first use.
    pub fn chain(&self, chain_id: ChainId) -> Arc<LocalChain> {
        Arc::clone(
            self.chains
                .write()
                .entry(chain_id)
                .or_insert_with(|| Arc::new(LocalChain::new(chain_id))),
        )
    }
}

impl ProviderFactory for LocalProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>, ControllerError> {
        Ok(Arc::new(LocalProvider::new(self.chain(config.chain_id))))
    }
}
