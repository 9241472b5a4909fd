//! # Security Alerts (PPOM)
//!
//! Screens dapp requests before the user sees them and attaches a verdict
//! to the approval. Built only when security alerts are enabled; building
//! without a verification key or data CDN fails.

use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerAction, ControllerMessenger};
use crate::ports::ChainIdSource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{ChainId, U256};
use std::sync::Arc;
use tracing::{debug, warn};

const APPROVE_SELECTOR: &str = "095ea7b3";
const SET_APPROVAL_FOR_ALL_SELECTOR: &str = "a22cb465";

/// Chains the validator has data for.
pub const SECURITY_SUPPORTED_CHAINS: &[ChainId] = &[
    ChainId::MAINNET,
    ChainId::BSC,
    ChainId::POLYGON,
    ChainId(42161),
    ChainId(10),
    ChainId::LINEA_MAINNET,
    ChainId::SEPOLIA,
];

const VALIDATED_METHODS: &[&str] = &[
    "eth_sendTransaction",
    "eth_sign",
    "personal_sign",
    "eth_signTypedData",
    "eth_signTypedData_v3",
    "eth_signTypedData_v4",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpomConfig {
    /// Key that signs the validator's data files.
    pub public_key: Option<String>,
    /// Where the validator's data files are downloaded from.
    pub cdn_base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ResultType {
    Benign,
    Malicious,
    Warning,
    Failed,
    RequestInProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAlertResponse {
    pub result_type: ResultType,
    pub reason: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl SecurityAlertResponse {
    fn new(result_type: ResultType, reason: &str) -> Self {
        Self {
            result_type,
            reason: reason.to_string(),
            features: Vec::new(),
        }
    }

    fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }
}

pub struct PpomController {
    messenger: Arc<ControllerMessenger>,
    chain_id: ChainIdSource,
    config: PpomConfig,
}

impl PpomController {
    /// The messenger must allow `PhishingController:testOrigin`.
    pub fn new(messenger: Arc<ControllerMessenger>, chain_id: ChainIdSource, config: PpomConfig) -> ControllerResult<Arc<Self>> {
        if config.public_key.as_deref().map_or(true, str::is_empty) {
            return Err(ControllerError::Config("security alerts need a public key".into()));
        }
        if config.cdn_base_url.as_deref().map_or(true, str::is_empty) {
            return Err(ControllerError::Config("security alerts need a data CDN".into()));
        }
        Ok(Arc::new(Self {
            messenger,
            chain_id,
            config,
        }))
    }

    #[must_use]
    pub fn config(&self) -> &PpomConfig {
        &self.config
    }

    /// Screen one request. `None` when the chain or method is not covered.
    pub async fn validate_request(&self, origin: &str, method: &str, params: &Value) -> Option<SecurityAlertResponse> {
        let chain_id = (self.chain_id)();
        if !SECURITY_SUPPORTED_CHAINS.contains(&chain_id) || !VALIDATED_METHODS.contains(&method) {
            return None;
        }

        let phishing = self
            .messenger
            .call(ControllerAction::TestOrigin {
                origin: origin.to_string(),
            })
            .await
            .and_then(|r| r.into_phishing());
        let response = match phishing {
            Ok(check) if check.result => {
                SecurityAlertResponse::new(ResultType::Malicious, "known_malicious_origin").with_feature(origin)
            }
            Ok(_) => inspect(method, params),
            Err(e) => {
                warn!(error = %e, "Origin screening failed");
                SecurityAlertResponse::new(ResultType::Failed, "failed")
            }
        };
        debug!(method, result = ?response.result_type, reason = %response.reason, "Request screened");
        Some(response)
    }
}

fn inspect(method: &str, params: &Value) -> SecurityAlertResponse {
    if method == "eth_sign" {
        return SecurityAlertResponse::new(ResultType::Warning, "raw_signature_farming");
    }
    if method != "eth_sendTransaction" {
        return SecurityAlertResponse::new(ResultType::Benign, "");
    }

    let data = params
        .get(0)
        .and_then(|tx| tx.get("data"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim_start_matches("0x")
        .to_ascii_lowercase();

    if let Some(args) = data.strip_prefix(APPROVE_SELECTOR) {
        let amount = args.get(64..128).and_then(|word| U256::from_str_radix(word, 16).ok());
        if amount == Some(U256::MAX) {
            return SecurityAlertResponse::new(ResultType::Warning, "approval_farming").with_feature("unlimited_approval");
        }
    }
    if let Some(args) = data.strip_prefix(SET_APPROVAL_FOR_ALL_SELECTOR) {
        let approved = args.get(64..128).is_some_and(|word| word.ends_with('1'));
        if approved {
            return SecurityAlertResponse::new(ResultType::Warning, "set_approval_for_all");
        }
    }
    SecurityAlertResponse::new(ResultType::Benign, "")
}

/// Analytics properties for a screened request.
#[must_use]
pub fn security_metrics_params(response: Option<&SecurityAlertResponse>) -> Value {
    match response {
        Some(r) => json!({
            "security_alert_response": r.result_type,
            "security_alert_reason": r.reason,
        }),
        None => json!({}),
    }
}
