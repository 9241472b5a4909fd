//! # JSON-RPC Error Model
//!
//! Every error returned to a dapp (through a WalletConnect session or the
//! in-app provider) is an `RpcError`. Codes follow EIP-1193 / JSON-RPC 2.0,
//! plus the WalletConnect SDK codes the session bridge needs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// EIP-1193 `userRejectedRequest`.
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-1193 `unauthorized`.
pub const UNAUTHORIZED: i64 = 4100;
/// EIP-1193 `unsupportedMethod`.
pub const UNSUPPORTED_METHOD: i64 = 4200;
/// WalletConnect SDK `USER_REJECTED_METHODS`.
pub const USER_REJECTED_METHODS: i64 = 5002;
/// JSON-RPC `invalidParams`.
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC `methodNotFound`.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC `internal`.
pub const INTERNAL_ERROR: i64 = -32603;
/// JSON-RPC `limitExceeded`.
pub const LIMIT_EXCEEDED: i64 = -32005;
/// Generic failure code used by the session bridge.
pub const GENERIC_FAILURE: i64 = 1;

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn user_rejected_request() -> Self {
        Self::new(USER_REJECTED_REQUEST, "User rejected the request.")
    }

    #[must_use]
    pub fn user_rejected_methods() -> Self {
        Self::new(USER_REJECTED_METHODS, "User rejected methods.")
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(UNAUTHORIZED, message)
    }

    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            METHOD_NOT_FOUND,
            format!("The method \"{method}\" does not exist / is not available."),
        )
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    #[must_use]
    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self::new(LIMIT_EXCEEDED, message)
    }

    /// `{ code: 1, message }` as used for bridge-level refusals.
    #[must_use]
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(GENERIC_FAILURE, message)
    }

    #[must_use]
    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED_REQUEST || self.code == USER_REJECTED_METHODS
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejection_codes() {
        assert!(RpcError::user_rejected_request().is_user_rejection());
        assert!(RpcError::user_rejected_methods().is_user_rejection());
        assert!(!RpcError::generic("Invalid Id").is_user_rejection());
    }

    #[test]
    fn test_serialization_skips_empty_data() {
        let json = serde_json::to_value(RpcError::generic("Manual disconnect")).unwrap();
        assert_eq!(json, serde_json::json!({"code": 1, "message": "Manual disconnect"}));
    }
}
