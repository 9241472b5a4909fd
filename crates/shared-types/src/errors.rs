//! # Error Types
//!
//! Parsing errors for the shared primitives.

use thiserror::Error;

/// Errors raised when a primitive cannot be parsed from its string form.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Address is not `0x` followed by 40 hex characters.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Chain id is neither hex, decimal nor CAIP-2 `eip155:<n>`.
    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),

    /// Quantity is not a `0x`-prefixed hex number.
    #[error("Invalid hex quantity: {0}")]
    InvalidQuantity(String),
}
