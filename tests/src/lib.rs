//! # Wallet Test Suite
//!
//! Cross-crate flows that need the engine, its controllers and the dapp
//! bridge running together.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # criterion benchmarks
//! └── src/integration/
//!     ├── engine_flows.rs   # bus, approvals, keyring, network settling
//!     └── bridge_flows.rs   # dapp requests through the live engine
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p wallet-tests
//! cargo test -p wallet-tests integration::bridge_flows::
//! cargo bench -p wallet-tests
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
