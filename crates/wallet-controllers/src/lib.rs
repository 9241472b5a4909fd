//! # Wallet Controllers
//!
//! Domain controllers composed by the wallet engine. Each controller owns one
//! state slice, publishes `<Name>:stateChange` on the message bus after every
//! update, and reaches its peers only through allow-listed bus actions or
//! accessor closures injected at construction.
//!
//! ## Controllers
//!
//! | Controller | Module | Depends on |
//! |------------|--------|------------|
//! | Approval | `approval` | - |
//! | Preferences | `preferences` | - |
//! | Network | `network` | `ProviderFactory` |
//! | AssetsContract | `assets::contract` | provider |
//! | Nft | `assets::nft` | selected address, chain id |
//! | Tokens | `assets::tokens` | chain id, selected address, approvals |
//! | TokenList | `assets::token_list` | `TokenListSource`, chain id |
//! | CurrencyRate | `assets::currency_rate` | `PriceSource` |
//! | GasFee | `gas_fee` | provider, EIP-1559 flag |
//! | Phishing | `phishing` | `PhishingListSource` |
//! | Keyring | `keyring` | preferences hooks |
//! | Permission | `permission` | approvals, keyring events |
//! | SubjectMetadata | `subject_metadata` | permissions |
//! | Snap | `snaps` | `ExecutionService`, approvals |
//! | AccountTracker | `assets::account_tracker` | provider, identities |
//! | AddressBook | `address_book` | - |
//! | TokenDetection | `assets::detection` | token list, contract, tokens |
//! | NftDetection | `assets::detection` | `NftSource`, nft |
//! | TokenBalances | `assets::balances` | contract, tokens |
//! | TokenRates | `assets::rates` | `PriceSource`, tokens |
//! | Transaction | `transaction` | provider, signer, approvals |
//! | Swaps | `swaps` | `SwapsQuoteSource` |
//! | Signature | `signature` | approvals, keyring actions, logging |
//! | Logging | `logging` | - |
//! | PPOM (security) | `security` | provider |
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  adapters/ - LocalProvider, static sources, snap runner  │
//! └──────────────────────────────────────────────────────────┘
//!                       ↑ implements ↑
//! ┌──────────────────────────────────────────────────────────┐
//! │  ports.rs - Provider, PriceSource, TransactionSigner ... │
//! └──────────────────────────────────────────────────────────┘
//!                         ↑ uses ↑
//! ┌──────────────────────────────────────────────────────────┐
//! │  controllers + base.rs + messaging.rs                    │
//! └──────────────────────────────────────────────────────────┘
//! ```

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod address_book;
pub mod approval;
pub mod assets;
pub mod base;
pub mod errors;
pub mod gas_fee;
pub mod keyring;
pub mod logging;
pub mod messaging;
pub mod network;
pub mod permission;
pub mod phishing;
pub mod polling;
pub mod ports;
pub mod preferences;
pub mod security;
pub mod signature;
pub mod snaps;
pub mod subject_metadata;
pub mod swaps;
pub mod transaction;

pub use approval::{
    AcceptOptions, AcceptResult, AddApprovalRequest, ApprovalConfig, ApprovalController,
    ApprovalOutcome, ApprovalState, PendingApproval,
};
pub use base::{BaseController, ControllerState};
pub use errors::{ApprovalError, ControllerError, ControllerResult, KeyringError};
pub use messaging::{
    ActionResponse, ControllerAction, ControllerBus, ControllerEvent, ControllerMessenger,
    ControllerName, StateSlice,
};
pub use network::{NetworkController, NetworkState, NetworkType, ProviderConfig};
pub use polling::Poller;
pub use ports::{
    ChainIdSource, FlagSource, Provider, ProviderFactory, ProviderSource, SelectedAddressSource,
    TransactionSigner,
};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::messaging::{ControllerBus, ControllerMessenger, ControllerName};
    use shared_bus::RestrictedConfig;
    use std::sync::Arc;

    /// Fresh bus plus a messenger for `name`.
    pub fn messenger_for(
        name: ControllerName,
        actions: &[&'static str],
        events: &[&'static str],
    ) -> (Arc<ControllerBus>, Arc<ControllerMessenger>) {
        let bus = Arc::new(ControllerBus::new());
        let messenger = messenger_on(&bus, name, actions, events);
        (bus, messenger)
    }

    /// Messenger for `name` on an existing bus.
    pub fn messenger_on(
        bus: &Arc<ControllerBus>,
        name: ControllerName,
        actions: &[&'static str],
        events: &[&'static str],
    ) -> Arc<ControllerMessenger> {
        Arc::new(
            bus.restricted(
                RestrictedConfig::new(name.as_str())
                    .allow_actions(actions)
                    .allow_events(events),
            )
            .unwrap(),
        )
    }
}
