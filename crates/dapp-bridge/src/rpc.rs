//! # RPC Method Middleware
//!
//! Answers a dapp's JSON-RPC call against the engine's controllers. Every
//! call is refused for phishing-listed origins. Signing and transaction
//! methods go through controllers that raise approvals, so the user gates
//! each of them. When security alerts are on, the screened result is
//! reported to analytics before dispatch.
//!
//! Methods without a wallet-side meaning are forwarded to the current
//! network provider.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use shared_crypto::TypedDataVersion;
use shared_types::{Address, RpcError};
use wallet_controllers::assets::tokens::Token;
use wallet_controllers::ports::AnalyticsSink;
use wallet_controllers::security::security_metrics_params;
use wallet_controllers::transaction::TransactionParams;
use wallet_engine::EngineContext;

pub struct RpcMiddleware {
    context: EngineContext,
    analytics: Arc<dyn AnalyticsSink>,
    origin: String,
}

/// `wallet_watchAsset` parameters.
#[derive(Debug, Deserialize)]
struct WatchAssetParams {
    #[serde(rename = "type")]
    kind: String,
    options: WatchAssetOptions,
}

#[derive(Debug, Deserialize)]
struct WatchAssetOptions {
    address: Address,
    symbol: String,
    decimals: u8,
    #[serde(default)]
    image: Option<String>,
}

impl RpcMiddleware {
    #[must_use]
    pub fn new(context: EngineContext, analytics: Arc<dyn AnalyticsSink>, origin: impl Into<String>) -> Self {
        Self {
            context,
            analytics,
            origin: origin.into(),
        }
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[instrument(name = "rpc_call", skip(self, params), fields(origin = %self.origin))]
    pub async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if self.context.phishing.test(&self.origin).result {
            warn!(method, "Refused call from a phishing-listed origin");
            return Err(RpcError::unauthorized(format!(
                "{} has been flagged as a phishing site",
                self.origin
            )));
        }
        self.screen(method, &params).await;

        match method {
            "eth_chainId" => Ok(json!(self.context.network.current_chain_id().to_hex())),
            "net_version" => Ok(json!(self.context.network.current_chain_id().network_id())),
            "eth_accounts" | "eth_requestAccounts" => Ok(json!(self.accounts())),
            "eth_coinbase" => Ok(self.accounts().first().map_or(Value::Null, |address| json!(address))),
            "personal_sign" => {
                let data = string_param(&params, 0)?;
                let from = address_param(&params, 1)?;
                self.context
                    .signature
                    .new_unsigned_personal_message(from, data, &self.origin)
                    .await
                    .map(Value::String)
                    .map_err(|e| e.to_rpc_error())
            }
            "eth_sign" => {
                let from = address_param(&params, 0)?;
                let data = string_param(&params, 1)?;
                self.context
                    .signature
                    .new_unsigned_message(from, data, &self.origin)
                    .await
                    .map(Value::String)
                    .map_err(|e| e.to_rpc_error())
            }
            "eth_signTypedData_v3" | "eth_signTypedData_v4" => {
                let version = if method.ends_with("v3") {
                    TypedDataVersion::V3
                } else {
                    TypedDataVersion::V4
                };
                let from = address_param(&params, 0)?;
                let data = params
                    .get(1)
                    .cloned()
                    .ok_or_else(|| RpcError::invalid_params("missing typed data"))?;
                self.context
                    .signature
                    .new_unsigned_typed_message(from, data, version, &self.origin)
                    .await
                    .map(Value::String)
                    .map_err(|e| e.to_rpc_error())
            }
            "eth_sendTransaction" => {
                let tx = transaction_param(&params)?;
                self.context
                    .transaction
                    .add_transaction(tx, &self.origin)
                    .await
                    .map(Value::String)
                    .map_err(|e| e.to_rpc_error())
            }
            "wallet_watchAsset" => self.watch_asset(params).await,
            _ => self.forward(method, params).await,
        }
    }

    /// The session is bound to the selected account only.
    fn accounts(&self) -> Vec<Address> {
        self.context.preferences.selected_address().into_iter().collect()
    }

    async fn screen(&self, method: &str, params: &Value) {
        let Some(security) = &self.context.security else {
            return;
        };
        if let Some(response) = security.validate_request(&self.origin, method, params).await {
            self.analytics
                .track("Dapp Request Screened", security_metrics_params(Some(&response)));
        }
    }

    async fn watch_asset(&self, params: Value) -> Result<Value, RpcError> {
        // Some clients wrap the object in a one-element array.
        let raw = match params {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };
        let request: WatchAssetParams =
            serde_json::from_value(raw).map_err(|e| RpcError::invalid_params(format!("wallet_watchAsset: {e}")))?;
        if !request.kind.eq_ignore_ascii_case("ERC20") {
            return Err(RpcError::invalid_params(format!(
                "Asset of type '{}' not supported",
                request.kind
            )));
        }
        let mut token = Token::new(request.options.address, request.options.symbol, request.options.decimals);
        token.image = request.options.image;

        self.context
            .tokens
            .watch_asset(token, &self.origin)
            .await
            .map_err(|e| e.to_rpc_error())?;
        Ok(json!(true))
    }

    async fn forward(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let provider = self
            .context
            .network
            .provider()
            .ok_or_else(|| RpcError::internal("No provider for the selected network"))?;
        debug!(method, "Forwarding to provider");
        provider.request(method, params).await
    }
}

fn string_param(params: &Value, index: usize) -> Result<String, RpcError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RpcError::invalid_params(format!("expected a string at position {index}")))
}

fn address_param(params: &Value, index: usize) -> Result<Address, RpcError> {
    let raw = string_param(params, index)?;
    Address::parse(&raw).map_err(|e| RpcError::invalid_params(e.to_string()))
}

pub(crate) fn transaction_param(params: &Value) -> Result<TransactionParams, RpcError> {
    let tx = params
        .get(0)
        .cloned()
        .ok_or_else(|| RpcError::invalid_params("missing transaction"))?;
    serde_json::from_value(tx).map_err(|e| RpcError::invalid_params(format!("transaction: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_param_reports_position() {
        let err = string_param(&json!([1]), 0).unwrap_err();
        assert!(err.message.contains("position 0"));
    }

    #[test]
    fn test_address_param_rejects_garbage() {
        assert!(address_param(&json!(["0x12"]), 0).is_err());
        assert!(address_param(&json!(["0x1111111111111111111111111111111111111111"]), 0).is_ok());
    }

    #[test]
    fn test_transaction_param_reads_first_element() {
        let tx = transaction_param(&json!([{
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x2222222222222222222222222222222222222222",
            "value": "0x1"
        }]))
        .unwrap();
        assert!(tx.to.is_some());
        assert!(transaction_param(&json!([])).is_err());
    }
}
