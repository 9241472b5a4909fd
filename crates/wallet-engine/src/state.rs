//! # Composed State
//!
//! `EngineState` is the read-only snapshot the UI renders from: one field per
//! stateful controller, each replaced whole when that controller publishes
//! `<Name>:stateChange`.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::trace;

use shared_bus::SubscriptionId;
use wallet_controllers::address_book::AddressBookState;
use wallet_controllers::approval::ApprovalState;
use wallet_controllers::assets::{
    AccountTrackerState, CurrencyRateState, NftState, TokenBalancesState, TokenListState, TokenRatesState,
    TokensState,
};
use wallet_controllers::gas_fee::GasFeeState;
use wallet_controllers::keyring::KeyringState;
use wallet_controllers::logging::LoggingState;
use wallet_controllers::permission::PermissionState;
use wallet_controllers::phishing::PhishingState;
use wallet_controllers::preferences::PreferencesState;
use wallet_controllers::signature::SignatureState;
use wallet_controllers::snaps::SnapState;
use wallet_controllers::subject_metadata::SubjectMetadataState;
use wallet_controllers::swaps::SwapsState;
use wallet_controllers::transaction::TransactionState;
use wallet_controllers::{ControllerBus, ControllerEvent, ControllerName, NetworkState, StateSlice};

use crate::container::EngineContext;

/// Snapshot of every controller's latest published state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineState {
    #[serde(rename = "ApprovalController")]
    pub approval: ApprovalState,
    #[serde(rename = "PreferencesController")]
    pub preferences: PreferencesState,
    #[serde(rename = "NetworkController")]
    pub network: NetworkState,
    #[serde(rename = "NftController")]
    pub nft: NftState,
    #[serde(rename = "TokensController")]
    pub tokens: TokensState,
    #[serde(rename = "TokenListController")]
    pub token_list: TokenListState,
    #[serde(rename = "CurrencyRateController")]
    pub currency_rate: CurrencyRateState,
    #[serde(rename = "GasFeeController")]
    pub gas_fee: GasFeeState,
    #[serde(rename = "PhishingController")]
    pub phishing: PhishingState,
    #[serde(rename = "KeyringController")]
    pub keyring: KeyringState,
    #[serde(rename = "PermissionController")]
    pub permission: PermissionState,
    #[serde(rename = "SubjectMetadataController")]
    pub subject_metadata: SubjectMetadataState,
    #[serde(rename = "SnapController")]
    pub snaps: SnapState,
    #[serde(rename = "AccountTrackerController")]
    pub account_tracker: AccountTrackerState,
    #[serde(rename = "AddressBookController")]
    pub address_book: AddressBookState,
    #[serde(rename = "TokenBalancesController")]
    pub token_balances: TokenBalancesState,
    #[serde(rename = "TokenRatesController")]
    pub token_rates: TokenRatesState,
    #[serde(rename = "TransactionController")]
    pub transaction: TransactionState,
    #[serde(rename = "SwapsController")]
    pub swaps: SwapsState,
    #[serde(rename = "SignatureController")]
    pub signature: SignatureState,
    #[serde(rename = "LoggingController")]
    pub logging: LoggingState,
}

impl EngineState {
    /// Read every controller directly.
    #[must_use]
    pub fn capture(context: &EngineContext) -> Self {
        Self {
            approval: context.approval.state(),
            preferences: context.preferences.state(),
            network: context.network.state(),
            nft: context.nft.state(),
            tokens: context.tokens.state(),
            token_list: context.token_list.state(),
            currency_rate: context.currency_rate.state(),
            gas_fee: context.gas_fee.state(),
            phishing: context.phishing.state(),
            keyring: context.keyring.state(),
            permission: context.permission.state(),
            subject_metadata: context.subject_metadata.state(),
            snaps: context.snaps.state(),
            account_tracker: context.account_tracker.state(),
            address_book: context.address_book.state(),
            token_balances: context.token_balances.state(),
            token_rates: context.token_rates.state(),
            transaction: context.transaction.state(),
            swaps: context.swaps.state(),
            signature: context.signature.state(),
            logging: context.logging.state(),
        }
    }

    /// Replace the slice owned by the publishing controller.
    pub fn apply(&mut self, slice: StateSlice) {
        match slice {
            StateSlice::Approval(s) => self.approval = s,
            StateSlice::Preferences(s) => self.preferences = s,
            StateSlice::Network(s) => self.network = s,
            StateSlice::Nft(s) => self.nft = s,
            StateSlice::Tokens(s) => self.tokens = s,
            StateSlice::TokenList(s) => self.token_list = s,
            StateSlice::CurrencyRate(s) => self.currency_rate = s,
            StateSlice::GasFee(s) => self.gas_fee = s,
            StateSlice::Phishing(s) => self.phishing = s,
            StateSlice::Keyring(s) => self.keyring = s,
            StateSlice::Permission(s) => self.permission = s,
            StateSlice::SubjectMetadata(s) => self.subject_metadata = s,
            StateSlice::Snap(s) => self.snaps = s,
            StateSlice::AccountTracker(s) => self.account_tracker = s,
            StateSlice::AddressBook(s) => self.address_book = s,
            StateSlice::TokenBalances(s) => self.token_balances = s,
            StateSlice::TokenRates(s) => self.token_rates = s,
            StateSlice::Transaction(s) => self.transaction = s,
            StateSlice::Swaps(s) => self.swaps = s,
            StateSlice::Signature(s) => self.signature = s,
            StateSlice::Logging(s) => self.logging = s,
        }
    }
}

/// Keeps an [`EngineState`] current by listening to every stateChange event.
pub struct StateAggregator {
    state: RwLock<EngineState>,
    subscriptions: RwLock<Vec<SubscriptionId>>,
}

impl StateAggregator {
    /// Seed from the controllers and subscribe to their stateChange events.
    pub fn attach(bus: &Arc<ControllerBus>, context: &EngineContext) -> Arc<Self> {
        let aggregator = Arc::new(Self {
            state: RwLock::new(EngineState::capture(context)),
            subscriptions: RwLock::new(Vec::new()),
        });

        let mut ids = Vec::with_capacity(ControllerName::stateful().len());
        for name in ControllerName::stateful() {
            let weak = Arc::downgrade(&aggregator);
            let namespace = name.as_str();
            let id = bus.subscribe(
                name.state_change_event(),
                Arc::new(move |event: &ControllerEvent| {
                    let ControllerEvent::StateChange(slice) = event else {
                        return;
                    };
                    if let Some(aggregator) = weak.upgrade() {
                        aggregator.state.write().apply((**slice).clone());
                        wallet_telemetry::metric_inc!(wallet_telemetry::BUS_EVENTS_PUBLISHED, &[namespace]);
                        trace!(controller = namespace, "State slice replaced");
                    }
                }),
            );
            ids.push(id);
        }
        *aggregator.subscriptions.write() = ids;
        aggregator
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> EngineState {
        self.state.read().clone()
    }

    /// Remove the bus subscriptions.
    pub fn detach(&self, bus: &ControllerBus) {
        for id in self.subscriptions.write().drain(..) {
            bus.unsubscribe(id);
        }
    }
}

impl std::fmt::Debug for StateAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateAggregator")
            .field("subscriptions", &self.subscriptions.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_controllers::assets::tokens::Token;

    #[test]
    fn test_apply_replaces_only_the_owning_slice() {
        let mut state = EngineState::default();
        let mut tokens = TokensState::default();
        tokens
            .tokens
            .push(Token::new(shared_types::Address::from_bytes([7u8; 20]), "DAI", 18));

        state.apply(StateSlice::Tokens(tokens.clone()));

        assert_eq!(state.tokens, tokens);
        assert_eq!(state.nft, NftState::default());
    }

    #[test]
    fn test_state_serializes_under_controller_names() {
        let json = serde_json::to_value(EngineState::default()).unwrap();
        assert!(json.get("TokensController").is_some());
        assert!(json.get("CurrencyRateController").is_some());
    }
}
