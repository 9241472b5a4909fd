//! # Dapp Bridge
//!
//! Brings external dapps into the wallet engine.
//!
//! - [`walletconnect`]: the WalletConnect v2 host. Session proposals become
//!   `WALLET_CONNECT` approvals; session requests are routed per topic into
//!   the engine's controllers and answered on the same topic.
//! - [`deeplink`]: routes SDK deep links to a reconnect or a new channel.
//! - [`rpc`]: the method middleware both paths share.
//!
//! ```rust,ignore
//! let host = WalletConnectHost::new(BridgeConfig::from_env(), Arc::new(GlobalEngine), BridgeServices::local());
//! host.init().await?;
//! host.get_instance()?.connect(uri, None, ORIGIN_DEEPLINK).await;
//! ```

pub mod adapters;
pub mod config;
pub mod constants;
pub mod deeplink;
pub mod engine_access;
pub mod errors;
pub mod rpc;
pub mod wait;
pub mod walletconnect;

pub use adapters::BridgeServices;
pub use config::BridgeConfig;
pub use deeplink::{DeeplinkAction, DeeplinkRequest, DeeplinkRouter, SdkConnect};
pub use engine_access::{EngineAccess, GlobalEngine};
pub use errors::{BridgeError, BridgeResult, ProtocolError};
pub use rpc::RpcMiddleware;
pub use walletconnect::{WalletConnectHost, WalletConnectManager};
