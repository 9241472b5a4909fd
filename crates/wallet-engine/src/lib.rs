//! # Wallet Engine
//!
//! Composition root of the wallet: builds every domain controller on one
//! message bus, keeps a composed state snapshot current and wires the
//! cross-controller side effects.
//!
//! ## Modular Structure
//!
//! - `container/` - configuration and the controller context
//! - `adapters/` - vault backup, notifications and the service bundle
//! - `wiring/` - network change reconfiguration, backups, pollers
//! - `state` - the composed snapshot
//! - `engine` / `host` - the live engine and its idempotent host
//!
//! ## Lifecycle
//!
//! ```text
//! EngineHost::init ──▶ EngineContext::build ──▶ StateAggregator::attach ──▶ EngineTasks::wire
//!                                                                                 │
//! EngineHost::destroy_engine ◀──────────── stop pollers, clear bus, reset ◀───────┘
//! ```

#![allow(clippy::type_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod container;
pub mod engine;
pub mod errors;
pub mod host;
pub mod state;
pub mod wiring;

pub use adapters::{EngineServices, NotificationSink, VaultBackupStore};
pub use container::{EngineConfig, EngineContext, InitialState};
pub use engine::{AcceptApprovalOptions, Engine, RejectApprovalOptions};
pub use errors::{EngineError, EngineResult};
pub use host::{engine, EngineHost};
pub use state::EngineState;
