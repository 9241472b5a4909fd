//! # Controller Messaging
//!
//! Concrete event and action types carried on the controller bus.
//!
//! | Namespace | Events | Actions |
//! |-----------|--------|---------|
//! | `ApprovalController` | `stateChange` | `addRequest`, `hasRequest`, `acceptRequest`, `rejectRequest` |
//! | `KeyringController` | `stateChange`, `lock`, `unlock`, `accountRemoved` | `getState`, `signMessage`, `signPersonalMessage`, `signTypedMessage` |
//! | `NetworkController` | `stateChange`, `networkDidChange` | |
//! | `PermissionController` | `stateChange` | `hasPermissions`, `getPermittedAccounts` |
//! | `PhishingController` | `stateChange` | `testOrigin` |
//! | `LoggingController` | `stateChange` | `add` |
//! | every other controller | `stateChange` | |

use crate::address_book::AddressBookState;
use crate::approval::{AddApprovalRequest, ApprovalOutcome, ApprovalState};
use crate::assets::account_tracker::AccountTrackerState;
use crate::assets::balances::TokenBalancesState;
use crate::assets::currency_rate::CurrencyRateState;
use crate::assets::nft::NftState;
use crate::assets::rates::TokenRatesState;
use crate::assets::token_list::TokenListState;
use crate::assets::tokens::TokensState;
use crate::errors::ControllerError;
use crate::gas_fee::GasFeeState;
use crate::keyring::KeyringState;
use crate::logging::{LogEntry, LoggingState};
use crate::network::{NetworkState, ProviderConfig};
use crate::permission::PermissionState;
use crate::phishing::{PhishingCheck, PhishingState};
use crate::preferences::PreferencesState;
use crate::signature::SignatureState;
use crate::snaps::SnapState;
use crate::subject_metadata::SubjectMetadataState;
use crate::swaps::SwapsState;
use crate::transaction::TransactionState;
use serde_json::Value;
use shared_bus::{BusAction, BusEvent, MessageBus, RestrictedMessenger};
use shared_crypto::TypedDataVersion;
use shared_types::{Address, RpcError};

/// The bus every controller is attached to.
pub type ControllerBus = MessageBus<ControllerEvent, ControllerAction>;

/// A controller's restricted view of the bus.
pub type ControllerMessenger = RestrictedMessenger<ControllerEvent, ControllerAction>;

/// Every controller, in engine construction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ControllerName {
    Approval,
    Preferences,
    Network,
    AssetsContract,
    Nft,
    Tokens,
    TokenList,
    CurrencyRate,
    GasFee,
    Phishing,
    Keyring,
    Permission,
    SubjectMetadata,
    Snap,
    AccountTracker,
    AddressBook,
    TokenDetection,
    NftDetection,
    TokenBalances,
    TokenRates,
    Transaction,
    Swaps,
    Signature,
    Logging,
    Security,
}

impl ControllerName {
    /// Bus namespace.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approval => "ApprovalController",
            Self::Preferences => "PreferencesController",
            Self::Network => "NetworkController",
            Self::AssetsContract => "AssetsContractController",
            Self::Nft => "NftController",
            Self::Tokens => "TokensController",
            Self::TokenList => "TokenListController",
            Self::CurrencyRate => "CurrencyRateController",
            Self::GasFee => "GasFeeController",
            Self::Phishing => "PhishingController",
            Self::Keyring => "KeyringController",
            Self::Permission => "PermissionController",
            Self::SubjectMetadata => "SubjectMetadataController",
            Self::Snap => "SnapController",
            Self::AccountTracker => "AccountTrackerController",
            Self::AddressBook => "AddressBookController",
            Self::TokenDetection => "TokenDetectionController",
            Self::NftDetection => "NftDetectionController",
            Self::TokenBalances => "TokenBalancesController",
            Self::TokenRates => "TokenRatesController",
            Self::Transaction => "TransactionController",
            Self::Swaps => "SwapsController",
            Self::Signature => "SignatureController",
            Self::Logging => "LoggingController",
            Self::Security => "PPOMController",
        }
    }

    /// `<Namespace>:stateChange`.
    #[must_use]
    pub const fn state_change_event(&self) -> &'static str {
        match self {
            Self::Approval => events::APPROVAL_STATE_CHANGE,
            Self::Preferences => events::PREFERENCES_STATE_CHANGE,
            Self::Network => events::NETWORK_STATE_CHANGE,
            Self::AssetsContract => "AssetsContractController:stateChange",
            Self::Nft => "NftController:stateChange",
            Self::Tokens => "TokensController:stateChange",
            Self::TokenList => "TokenListController:stateChange",
            Self::CurrencyRate => "CurrencyRateController:stateChange",
            Self::GasFee => "GasFeeController:stateChange",
            Self::Phishing => "PhishingController:stateChange",
            Self::Keyring => events::KEYRING_STATE_CHANGE,
            Self::Permission => "PermissionController:stateChange",
            Self::SubjectMetadata => "SubjectMetadataController:stateChange",
            Self::Snap => "SnapController:stateChange",
            Self::AccountTracker => "AccountTrackerController:stateChange",
            Self::AddressBook => "AddressBookController:stateChange",
            Self::TokenDetection => "TokenDetectionController:stateChange",
            Self::NftDetection => "NftDetectionController:stateChange",
            Self::TokenBalances => "TokenBalancesController:stateChange",
            Self::TokenRates => "TokenRatesController:stateChange",
            Self::Transaction => "TransactionController:stateChange",
            Self::Swaps => "SwapsController:stateChange",
            Self::Signature => "SignatureController:stateChange",
            Self::Logging => "LoggingController:stateChange",
            Self::Security => "PPOMController:stateChange",
        }
    }

    /// Controllers that own a state slice in the composed snapshot.
    #[must_use]
    pub fn stateful() -> &'static [ControllerName] {
        &[
            Self::Approval,
            Self::Preferences,
            Self::Network,
            Self::Nft,
            Self::Tokens,
            Self::TokenList,
            Self::CurrencyRate,
            Self::GasFee,
            Self::Phishing,
            Self::Keyring,
            Self::Permission,
            Self::SubjectMetadata,
            Self::Snap,
            Self::AccountTracker,
            Self::AddressBook,
            Self::TokenBalances,
            Self::TokenRates,
            Self::Transaction,
            Self::Swaps,
            Self::Signature,
            Self::Logging,
        ]
    }
}

/// Event identifiers referenced outside their owning module.
pub mod events {
    pub const APPROVAL_STATE_CHANGE: &str = "ApprovalController:stateChange";
    pub const PREFERENCES_STATE_CHANGE: &str = "PreferencesController:stateChange";
    pub const NETWORK_STATE_CHANGE: &str = "NetworkController:stateChange";
    pub const NETWORK_DID_CHANGE: &str = "NetworkController:networkDidChange";
    pub const KEYRING_STATE_CHANGE: &str = "KeyringController:stateChange";
    pub const KEYRING_LOCK: &str = "KeyringController:lock";
    pub const KEYRING_UNLOCK: &str = "KeyringController:unlock";
    pub const KEYRING_ACCOUNT_REMOVED: &str = "KeyringController:accountRemoved";
}

/// Action identifiers.
pub mod actions {
    pub const APPROVAL_ADD_REQUEST: &str = "ApprovalController:addRequest";
    pub const APPROVAL_HAS_REQUEST: &str = "ApprovalController:hasRequest";
    pub const APPROVAL_ACCEPT_REQUEST: &str = "ApprovalController:acceptRequest";
    pub const APPROVAL_REJECT_REQUEST: &str = "ApprovalController:rejectRequest";
    pub const PERMISSION_HAS_PERMISSIONS: &str = "PermissionController:hasPermissions";
    pub const PERMISSION_GET_PERMITTED_ACCOUNTS: &str = "PermissionController:getPermittedAccounts";
    pub const KEYRING_GET_STATE: &str = "KeyringController:getState";
    pub const KEYRING_SIGN_MESSAGE: &str = "KeyringController:signMessage";
    pub const KEYRING_SIGN_PERSONAL_MESSAGE: &str = "KeyringController:signPersonalMessage";
    pub const KEYRING_SIGN_TYPED_MESSAGE: &str = "KeyringController:signTypedMessage";
    pub const PHISHING_TEST_ORIGIN: &str = "PhishingController:testOrigin";
    pub const LOGGING_ADD: &str = "LoggingController:add";
}

/// One controller's published state.
#[derive(Debug, Clone)]
pub enum StateSlice {
    Approval(ApprovalState),
    Preferences(PreferencesState),
    Network(NetworkState),
    Nft(NftState),
    Tokens(TokensState),
    TokenList(TokenListState),
    CurrencyRate(CurrencyRateState),
    GasFee(GasFeeState),
    Phishing(PhishingState),
    Keyring(KeyringState),
    Permission(PermissionState),
    SubjectMetadata(SubjectMetadataState),
    Snap(SnapState),
    AccountTracker(AccountTrackerState),
    AddressBook(AddressBookState),
    TokenBalances(TokenBalancesState),
    TokenRates(TokenRatesState),
    Transaction(TransactionState),
    Swaps(SwapsState),
    Signature(SignatureState),
    Logging(LoggingState),
}

impl StateSlice {
    #[must_use]
    pub fn controller(&self) -> ControllerName {
        match self {
            Self::Approval(_) => ControllerName::Approval,
            Self::Preferences(_) => ControllerName::Preferences,
            Self::Network(_) => ControllerName::Network,
            Self::Nft(_) => ControllerName::Nft,
            Self::Tokens(_) => ControllerName::Tokens,
            Self::TokenList(_) => ControllerName::TokenList,
            Self::CurrencyRate(_) => ControllerName::CurrencyRate,
            Self::GasFee(_) => ControllerName::GasFee,
            Self::Phishing(_) => ControllerName::Phishing,
            Self::Keyring(_) => ControllerName::Keyring,
            Self::Permission(_) => ControllerName::Permission,
            Self::SubjectMetadata(_) => ControllerName::SubjectMetadata,
            Self::Snap(_) => ControllerName::Snap,
            Self::AccountTracker(_) => ControllerName::AccountTracker,
            Self::AddressBook(_) => ControllerName::AddressBook,
            Self::TokenBalances(_) => ControllerName::TokenBalances,
            Self::TokenRates(_) => ControllerName::TokenRates,
            Self::Transaction(_) => ControllerName::Transaction,
            Self::Swaps(_) => ControllerName::Swaps,
            Self::Signature(_) => ControllerName::Signature,
            Self::Logging(_) => ControllerName::Logging,
        }
    }
}

/// Events carried on the controller bus.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// A controller replaced its state.
    StateChange(Box<StateSlice>),
    /// The keyring was locked.
    KeyringLocked,
    /// The keyring was unlocked.
    KeyringUnlocked,
    /// An account was removed from the keyring.
    KeyringAccountRemoved(Address),
    /// The selected network (provider configuration) changed.
    NetworkDidChange(ProviderConfig),
}

impl BusEvent for ControllerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::StateChange(slice) => slice.controller().state_change_event(),
            Self::KeyringLocked => events::KEYRING_LOCK,
            Self::KeyringUnlocked => events::KEYRING_UNLOCK,
            Self::KeyringAccountRemoved(_) => events::KEYRING_ACCOUNT_REMOVED,
            Self::NetworkDidChange(_) => events::NETWORK_DID_CHANGE,
        }
    }

    fn catalog() -> &'static [&'static str] {
        &[
            events::APPROVAL_STATE_CHANGE,
            events::PREFERENCES_STATE_CHANGE,
            events::NETWORK_STATE_CHANGE,
            events::NETWORK_DID_CHANGE,
            "NftController:stateChange",
            "TokensController:stateChange",
            "TokenListController:stateChange",
            "CurrencyRateController:stateChange",
            "GasFeeController:stateChange",
            "PhishingController:stateChange",
            events::KEYRING_STATE_CHANGE,
            events::KEYRING_LOCK,
            events::KEYRING_UNLOCK,
            events::KEYRING_ACCOUNT_REMOVED,
            "PermissionController:stateChange",
            "SubjectMetadataController:stateChange",
            "SnapController:stateChange",
            "AccountTrackerController:stateChange",
            "AddressBookController:stateChange",
            "TokenBalancesController:stateChange",
            "TokenRatesController:stateChange",
            "TransactionController:stateChange",
            "SwapsController:stateChange",
            "SignatureController:stateChange",
            "LoggingController:stateChange",
        ]
    }
}

/// Actions routed through the controller bus.
#[derive(Debug)]
pub enum ControllerAction {
    AddApprovalRequest(AddApprovalRequest),
    HasApprovalRequest { id: String },
    AcceptApprovalRequest { id: String, value: Option<Value> },
    RejectApprovalRequest { id: String, error: RpcError },
    HasPermissions { origin: String },
    GetPermittedAccounts { origin: String },
    GetKeyringState,
    SignMessage { from: Address, data: String },
    SignPersonalMessage { from: Address, data: String },
    SignTypedMessage { from: Address, data: Value, version: TypedDataVersion },
    TestOrigin { origin: String },
    AddLog(LogEntry),
}

impl BusAction for ControllerAction {
    type Output = ActionResponse;
    type Error = ControllerError;

    fn action_type(&self) -> &'static str {
        match self {
            Self::AddApprovalRequest(_) => actions::APPROVAL_ADD_REQUEST,
            Self::HasApprovalRequest { .. } => actions::APPROVAL_HAS_REQUEST,
            Self::AcceptApprovalRequest { .. } => actions::APPROVAL_ACCEPT_REQUEST,
            Self::RejectApprovalRequest { .. } => actions::APPROVAL_REJECT_REQUEST,
            Self::HasPermissions { .. } => actions::PERMISSION_HAS_PERMISSIONS,
            Self::GetPermittedAccounts { .. } => actions::PERMISSION_GET_PERMITTED_ACCOUNTS,
            Self::GetKeyringState => actions::KEYRING_GET_STATE,
            Self::SignMessage { .. } => actions::KEYRING_SIGN_MESSAGE,
            Self::SignPersonalMessage { .. } => actions::KEYRING_SIGN_PERSONAL_MESSAGE,
            Self::SignTypedMessage { .. } => actions::KEYRING_SIGN_TYPED_MESSAGE,
            Self::TestOrigin { .. } => actions::PHISHING_TEST_ORIGIN,
            Self::AddLog(_) => actions::LOGGING_ADD,
        }
    }
}

/// Responses to [`ControllerAction`]s.
pub enum ActionResponse {
    Unit,
    Bool(bool),
    Approval(ApprovalOutcome),
    Accounts(Vec<Address>),
    KeyringState(KeyringState),
    Signature(String),
    Phishing(PhishingCheck),
}

impl std::fmt::Debug for ActionResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unit => write!(f, "Unit"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Approval(o) => write!(f, "Approval(value={:?})", o.value),
            Self::Accounts(a) => write!(f, "Accounts({a:?})"),
            Self::KeyringState(_) => write!(f, "KeyringState(..)"),
            Self::Signature(s) => write!(f, "Signature({s})"),
            Self::Phishing(p) => write!(f, "Phishing({p:?})"),
        }
    }
}

impl ActionResponse {
    pub fn into_bool(self) -> Result<bool, ControllerError> {
        match self {
            Self::Bool(b) => Ok(b),
            _ => Err(ControllerError::UnexpectedResponse("bool")),
        }
    }

    pub fn into_approval(self) -> Result<ApprovalOutcome, ControllerError> {
        match self {
            Self::Approval(o) => Ok(o),
            _ => Err(ControllerError::UnexpectedResponse("approval")),
        }
    }

    pub fn into_accounts(self) -> Result<Vec<Address>, ControllerError> {
        match self {
            Self::Accounts(a) => Ok(a),
            _ => Err(ControllerError::UnexpectedResponse("accounts")),
        }
    }

    pub fn into_signature(self) -> Result<String, ControllerError> {
        match self {
            Self::Signature(s) => Ok(s),
            _ => Err(ControllerError::UnexpectedResponse("signature")),
        }
    }

    pub fn into_phishing(self) -> Result<PhishingCheck, ControllerError> {
        match self {
            Self::Phishing(p) => Ok(p),
            _ => Err(ControllerError::UnexpectedResponse("phishing")),
        }
    }

    pub fn into_keyring_state(self) -> Result<KeyringState, ControllerError> {
        match self {
            Self::KeyringState(s) => Ok(s),
            _ => Err(ControllerError::UnexpectedResponse("keyring state")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_stateful_controller_is_in_catalog() {
        let catalog = ControllerEvent::catalog();
        for name in ControllerName::stateful() {
            assert!(
                catalog.contains(&name.state_change_event()),
                "{} missing",
                name.as_str()
            );
        }
    }

    #[test]
    fn test_state_change_names_use_namespace() {
        for name in ControllerName::stateful() {
            let event = name.state_change_event();
            assert_eq!(shared_bus::namespace_of(event), Some(name.as_str()));
        }
    }
}
