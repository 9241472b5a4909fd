//! # Engine Container
//!
//! Configuration plus the fixed set of controller instances a live engine
//! owns. Controllers are built in dependency order; see [`context`].

pub mod config;
pub mod context;

pub use config::{
    ApiKeys, BackupConfig, EngineConfig, KeyringConfig, NetworkSettings, PollingConfig, SecurityConfig,
    SettleDelay, SwapsConfig, DEFAULT_SETTLE_DELAY,
};
pub use context::{EngineContext, InitialState};
