//! # Approval Requests
//!
//! The unit of user consent. Every sensitive action (connect, sign, send,
//! watch asset, permission grant) is represented as one pending approval
//! that is resolved exactly once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of user decision an approval represents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApprovalType {
    WalletConnect,
    Transaction,
    PersonalSign,
    EthSign,
    EthSignTypedData,
    WatchAsset,
    RequestPermissions,
    SwitchEthereumChain,
    AddEthereumChain,
    SnapDialog,
    Custom(String),
}

impl ApprovalType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::WalletConnect => "WALLET_CONNECT",
            Self::Transaction => "transaction",
            Self::PersonalSign => "personal_sign",
            Self::EthSign => "eth_sign",
            Self::EthSignTypedData => "eth_signTypedData",
            Self::WatchAsset => "wallet_watchAsset",
            Self::RequestPermissions => "wallet_requestPermissions",
            Self::SwitchEthereumChain => "wallet_switchEthereumChain",
            Self::AddEthereumChain => "wallet_addEthereumChain",
            Self::SnapDialog => "snap_dialog",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for ApprovalType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "WALLET_CONNECT" => Self::WalletConnect,
            "transaction" => Self::Transaction,
            "personal_sign" => Self::PersonalSign,
            "eth_sign" => Self::EthSign,
            "eth_signTypedData" => Self::EthSignTypedData,
            "wallet_watchAsset" => Self::WatchAsset,
            "wallet_requestPermissions" => Self::RequestPermissions,
            "wallet_switchEthereumChain" => Self::SwitchEthereumChain,
            "wallet_addEthereumChain" => Self::AddEthereumChain,
            "snap_dialog" => Self::SnapDialog,
            _ => Self::Custom(value),
        }
    }
}

impl From<ApprovalType> for String {
    fn from(value: ApprovalType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending approval as stored in approval state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub id: String,
    pub origin: String,
    #[serde(rename = "type")]
    pub request_type: ApprovalType,
    #[serde(default)]
    pub request_data: Value,
    /// Creation time in milliseconds since the Unix epoch.
    pub time: u64,
    /// Whether the requester will report a final result after acceptance.
    #[serde(default)]
    pub expects_result: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_type_round_trip_names() {
        assert_eq!(ApprovalType::from("WALLET_CONNECT".to_string()), ApprovalType::WalletConnect);
        assert_eq!(ApprovalType::Transaction.as_str(), "transaction");
        assert_eq!(
            ApprovalType::from("snap_manageAccounts".to_string()),
            ApprovalType::Custom("snap_manageAccounts".into())
        );
    }
}
