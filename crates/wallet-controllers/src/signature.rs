//! # Signature Controller
//!
//! Message signing requests (`personal_sign`, `eth_sign`, typed data) from
//! dapps. Each request is held as unapproved while the user decides, signed
//! by the keyring over the bus once accepted, and recorded in the signing
//! log at every stage.

use crate::approval::AddApprovalRequest;
use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::logging::{LogEntry, SigningStage};
use crate::messaging::{ControllerAction, ControllerMessenger, ControllerName, StateSlice};
use crate::ports::{ChainIdSource, FlagSource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_crypto::TypedDataVersion;
use shared_types::{now_millis, Address, ApprovalType, ChainId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "personal_sign")]
    Personal,
    #[serde(rename = "eth_sign")]
    EthSign,
    #[serde(rename = "eth_signTypedData")]
    Typed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnapprovedMessage {
    pub id: String,
    pub origin: String,
    pub from: Address,
    pub data: Value,
    pub kind: MessageKind,
    pub time: u64,
}

/// Signature state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureState {
    pub unapproved_personal_msgs: BTreeMap<String, UnapprovedMessage>,
    pub unapproved_msgs: BTreeMap<String, UnapprovedMessage>,
    pub unapproved_typed_messages: BTreeMap<String, UnapprovedMessage>,
}

impl SignatureState {
    fn bucket(&mut self, kind: MessageKind) -> &mut BTreeMap<String, UnapprovedMessage> {
        match kind {
            MessageKind::Personal => &mut self.unapproved_personal_msgs,
            MessageKind::EthSign => &mut self.unapproved_msgs,
            MessageKind::Typed => &mut self.unapproved_typed_messages,
        }
    }

    #[must_use]
    pub fn unapproved_count(&self) -> usize {
        self.unapproved_personal_msgs.len() + self.unapproved_msgs.len() + self.unapproved_typed_messages.len()
    }
}

impl ControllerState for SignatureState {
    const NAME: ControllerName = ControllerName::Signature;

    fn into_slice(self) -> StateSlice {
        StateSlice::Signature(self)
    }
}

pub struct SignatureController {
    base: BaseController<SignatureState>,
    chain_id: ChainIdSource,
    eth_sign_enabled: FlagSource,
}

impl SignatureController {
    /// The messenger must allow `ApprovalController:addRequest`, the keyring
    /// signing actions and `LoggingController:add`.
    pub fn new(messenger: Arc<ControllerMessenger>, chain_id: ChainIdSource, eth_sign_enabled: FlagSource) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, SignatureState::default()),
            chain_id,
            eth_sign_enabled,
        })
    }

    #[must_use]
    pub fn state(&self) -> SignatureState {
        self.base.state()
    }

    pub async fn new_unsigned_personal_message(&self, from: Address, data: String, origin: &str) -> ControllerResult<String> {
        self.process(MessageKind::Personal, "personal_sign", from, json!(data), origin, None)
            .await
    }

    /// `eth_sign` signs an arbitrary 32-byte digest and is refused unless
    /// the user turned it on.
    pub async fn new_unsigned_message(&self, from: Address, data: String, origin: &str) -> ControllerResult<String> {
        if !(self.eth_sign_enabled)() {
            return Err(ControllerError::Disabled(
                "eth_sign has been disabled. You must enable it in the advanced settings".into(),
            ));
        }
        self.process(MessageKind::EthSign, "eth_sign", from, json!(data), origin, None)
            .await
    }

    pub async fn new_unsigned_typed_message(
        &self,
        from: Address,
        data: Value,
        version: TypedDataVersion,
        origin: &str,
    ) -> ControllerResult<String> {
        // Some dapps send the typed data as a JSON string.
        let data = match data {
            Value::String(raw) => {
                serde_json::from_str(&raw).map_err(|e| ControllerError::InvalidParams(format!("typed data: {e}")))?
            }
            other => other,
        };
        if let Some(requested) = domain_chain_id(&data)? {
            let current = (self.chain_id)();
            if requested != current {
                return Err(ControllerError::InvalidParams(format!(
                    "Provided chainId \"{requested}\" must match the active chainId \"{current}\""
                )));
            }
        }
        let method = match version {
            TypedDataVersion::V3 => "eth_signTypedData_v3",
            TypedDataVersion::V4 => "eth_signTypedData_v4",
        };
        self.process(MessageKind::Typed, method, from, data, origin, Some(version))
            .await
    }

    async fn process(
        &self,
        kind: MessageKind,
        method: &'static str,
        from: Address,
        data: Value,
        origin: &str,
        version: Option<TypedDataVersion>,
    ) -> ControllerResult<String> {
        let message = UnapprovedMessage {
            id: uuid::Uuid::new_v4().to_string(),
            origin: origin.to_string(),
            from: from.clone(),
            data: data.clone(),
            kind,
            time: now_millis(),
        };
        let id = message.id.clone();
        let params = json!({ "from": from, "data": data, "origin": origin });
        self.base.update(|state| {
            state.bucket(kind).insert(id.clone(), message);
        });
        self.log(method, SigningStage::Proposed, params.clone()).await;

        let approval_type = match kind {
            MessageKind::Personal => ApprovalType::PersonalSign,
            MessageKind::EthSign => ApprovalType::EthSign,
            MessageKind::Typed => ApprovalType::EthSignTypedData,
        };
        let messenger = self.base.messenger();
        let approval = messenger
            .call(ControllerAction::AddApprovalRequest(
                AddApprovalRequest::new(origin, approval_type, params.clone()).with_id(id.clone()),
            ))
            .await;

        let signed = match approval {
            Ok(_) => {
                let action = match (kind, version) {
                    (MessageKind::Typed, Some(version)) => ControllerAction::SignTypedMessage { from, data, version },
                    (MessageKind::Typed, None) => ControllerAction::SignTypedMessage {
                        from,
                        data,
                        version: TypedDataVersion::V4,
                    },
                    (MessageKind::EthSign, _) => ControllerAction::SignMessage {
                        from,
                        data: data.as_str().unwrap_or_default().to_string(),
                    },
                    (MessageKind::Personal, _) => ControllerAction::SignPersonalMessage {
                        from,
                        data: data.as_str().unwrap_or_default().to_string(),
                    },
                };
                messenger.call(action).await.and_then(|r| r.into_signature())
            }
            Err(e) => Err(e),
        };

        self.base.update(|state| {
            state.bucket(kind).remove(&id);
        });
        match signed {
            Ok(signature) => {
                info!(id = %id, method, "Message signed");
                self.log(method, SigningStage::Approved, params).await;
                Ok(signature)
            }
            Err(e) => {
                self.log(method, SigningStage::Rejected, params).await;
                Err(e)
            }
        }
    }

    async fn log(&self, method: &str, stage: SigningStage, params: Value) {
        let entry = LogEntry::signing(method, stage, params);
        if let Err(e) = self.base.messenger().call(ControllerAction::AddLog(entry)).await {
            warn!(error = %e, "Signing log entry dropped");
        }
    }

    /// Forget every unapproved message.
    pub fn clear_unapproved(&self) {
        self.base.reset();
    }
}

fn domain_chain_id(data: &Value) -> ControllerResult<Option<ChainId>> {
    match data.get("domain").and_then(|d| d.get("chainId")) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|n| Some(ChainId(n)))
            .ok_or_else(|| ControllerError::InvalidParams("invalid domain chainId".into())),
        Some(Value::String(s)) => Ok(Some(ChainId::parse(s)?)),
        Some(_) => Err(ControllerError::InvalidParams("invalid domain chainId".into())),
    }
}
