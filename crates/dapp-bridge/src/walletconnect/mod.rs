//! WalletConnect v2: protocol boundary, per-session adapters and the host
//! that owns them.

pub mod client;
pub mod host;
pub mod session;
pub mod uri;

pub use client::{
    DappRedirect, LegacyConnector, PeerMetadata, Session, SessionProposal, SessionRequest, SignClient,
    SignClientEvent, SignClientFactory,
};
pub use host::{WalletConnectHost, WalletConnectManager};
pub use session::{SessionAdapter, SessionOrigin};
pub use uri::WalletConnectUri;
