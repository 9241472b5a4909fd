//! # Shared Types Crate
//!
//! This crate contains the domain primitives used across the wallet engine:
//! addresses, chain identifiers, approval requests and the JSON-RPC error
//! model that every dapp-facing response is expressed in.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **Normalized Identity**: Addresses are stored lowercase and chain ids as
//!   integers, so comparisons never depend on the caller's formatting.

pub mod approval;
pub mod entities;
pub mod errors;
pub mod rpc;

pub use approval::*;
pub use entities::*;
pub use errors::*;
pub use rpc::*;
