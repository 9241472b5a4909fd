//! # Controller Context
//!
//! Holds every controller instance and builds them in dependency order.
//!
//! ## Construction Order
//!
//! ```text
//! Phase 1: Approval, Preferences
//! Phase 2: Network (provider initialized eagerly)
//! Phase 3: AssetsContract, Nft, Tokens, TokenList, CurrencyRate, GasFee, Phishing
//! Phase 4: Keyring, Permission, SubjectMetadata, Snap
//! Phase 5: AccountTracker, AddressBook, TokenDetection, NftDetection,
//!          TokenBalances, TokenRates, Transaction, Swaps, Logging, Signature
//! Phase 6: Security alerts (feature flag)
//! Phase 7: Caller-supplied initial state
//! ```
//!
//! Controllers never hold each other directly unless they compose (token
//! detection over tokens, for example). Everything else is reached through
//! accessor closures or allow-listed bus actions.
//!
//! Logging is built right before Signature: a messenger may only allow
//! actions that already have a handler, and Signature calls
//! `LoggingController:add`.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{error, info, instrument};

use shared_bus::RestrictedConfig;
use shared_types::Address;
use wallet_controllers::address_book::{AddressBookController, AddressBookState};
use wallet_controllers::approval::{ApprovalConfig, ApprovalController};
use wallet_controllers::assets::account_tracker::IdentitiesSource;
use wallet_controllers::assets::{
    AccountTrackerController, AccountTrackerState, AssetsContractController, CurrencyRateController,
    CurrencyRateState, NftController, NftDetectionController, NftState, TokenBalancesController, TokenBalancesState,
    TokenDetectionController, TokenListController, TokenListState, TokenRatesController, TokenRatesState,
    TokensController, TokensState,
};
use wallet_controllers::gas_fee::GasFeeController;
use wallet_controllers::keyring::{KeyringController, KeyringHooks, KeyringState};
use wallet_controllers::logging::{LoggingController, LoggingState};
use wallet_controllers::messaging::{actions, events};
use wallet_controllers::network::{NetworkController, NetworkState};
use wallet_controllers::permission::{PermissionController, PermissionState};
use wallet_controllers::phishing::{PhishingController, PhishingState};
use wallet_controllers::ports::{ExecutionService, FlagSource, SelectedAddressSource};
use wallet_controllers::preferences::{PreferencesController, PreferencesState};
use wallet_controllers::security::PpomController;
use wallet_controllers::signature::SignatureController;
use wallet_controllers::snaps::{SnapController, SnapState};
use wallet_controllers::subject_metadata::{
    SubjectMetadataController, SubjectMetadataState, DEFAULT_SUBJECT_CACHE_LIMIT,
};
use wallet_controllers::swaps::SwapsController;
use wallet_controllers::transaction::{TransactionController, TransactionSources, TransactionState};
use wallet_controllers::{ControllerBus, ControllerMessenger, ControllerName};

use crate::adapters::EngineServices;
use crate::container::config::EngineConfig;
use crate::errors::{EngineError, EngineResult};

/// Caller-supplied state, applied after construction.
///
/// Preferences and network are applied at construction instead: the
/// provider and the detection flags are read while building.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitialState {
    #[serde(rename = "PreferencesController")]
    pub preferences: Option<PreferencesState>,
    #[serde(rename = "NetworkController")]
    pub network: Option<NetworkState>,
    #[serde(rename = "TokensController")]
    pub tokens: Option<TokensState>,
    #[serde(rename = "NftController")]
    pub nft: Option<NftState>,
    #[serde(rename = "CurrencyRateController")]
    pub currency_rate: Option<CurrencyRateState>,
    #[serde(rename = "PermissionController")]
    pub permission: Option<PermissionState>,
    #[serde(rename = "SubjectMetadataController")]
    pub subject_metadata: Option<SubjectMetadataState>,
    #[serde(rename = "SnapController")]
    pub snaps: Option<SnapState>,
    #[serde(rename = "AccountTrackerController")]
    pub account_tracker: Option<AccountTrackerState>,
    #[serde(rename = "AddressBookController")]
    pub address_book: Option<AddressBookState>,
    #[serde(rename = "TokenBalancesController")]
    pub token_balances: Option<TokenBalancesState>,
    #[serde(rename = "TokenRatesController")]
    pub token_rates: Option<TokenRatesState>,
    #[serde(rename = "TransactionController")]
    pub transaction: Option<TransactionState>,
    #[serde(rename = "LoggingController")]
    pub logging: Option<LoggingState>,
}

/// Every controller of a live engine.
#[derive(Clone)]
pub struct EngineContext {
    pub approval: Arc<ApprovalController>,
    pub preferences: Arc<PreferencesController>,
    pub network: Arc<NetworkController>,
    pub assets_contract: Arc<AssetsContractController>,
    pub nft: Arc<NftController>,
    pub tokens: Arc<TokensController>,
    pub token_list: Arc<TokenListController>,
    pub currency_rate: Arc<CurrencyRateController>,
    pub gas_fee: Arc<GasFeeController>,
    pub phishing: Arc<PhishingController>,
    pub keyring: Arc<KeyringController>,
    pub permission: Arc<PermissionController>,
    pub subject_metadata: Arc<SubjectMetadataController>,
    pub snap_execution: Arc<dyn ExecutionService>,
    pub snaps: Arc<SnapController>,
    pub account_tracker: Arc<AccountTrackerController>,
    pub address_book: Arc<AddressBookController>,
    pub token_detection: Arc<TokenDetectionController>,
    pub nft_detection: Arc<NftDetectionController>,
    pub token_balances: Arc<TokenBalancesController>,
    pub token_rates: Arc<TokenRatesController>,
    pub transaction: Arc<TransactionController>,
    pub swaps: Arc<SwapsController>,
    pub signature: Arc<SignatureController>,
    pub logging: Arc<LoggingController>,
    /// Present only when security alerts are enabled.
    pub security: Option<Arc<PpomController>>,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("security", &self.security.is_some())
            .finish_non_exhaustive()
    }
}

fn messenger(
    bus: &Arc<ControllerBus>,
    name: ControllerName,
    allowed_actions: &[&'static str],
    allowed_events: &[&'static str],
) -> EngineResult<Arc<ControllerMessenger>> {
    let config = RestrictedConfig::new(name.as_str())
        .allow_actions(allowed_actions)
        .allow_events(allowed_events);
    Ok(Arc::new(bus.restricted(config)?))
}

impl EngineContext {
    /// Build every controller.
    ///
    /// Fails as a whole: a controller that cannot be built leaves nothing
    /// behind but the bus registrations, which the caller drops.
    #[instrument(name = "engine_init", skip_all)]
    pub async fn build(
        bus: &Arc<ControllerBus>,
        config: &EngineConfig,
        services: &EngineServices,
        initial: &InitialState,
        initial_keyring_state: Option<KeyringState>,
    ) -> EngineResult<Self> {
        // =====================================================================
        // PHASE 1: Consent and preferences
        // =====================================================================
        info!("Phase 1: Approval and preferences");
        let approval = ApprovalController::new(messenger(bus, ControllerName::Approval, &[], &[])?, ApprovalConfig::default())?;
        let preferences = PreferencesController::new(
            messenger(bus, ControllerName::Preferences, &[], &[])?,
            initial.preferences.clone().unwrap_or_default(),
        );

        let selected_address: SelectedAddressSource = {
            let preferences = Arc::clone(&preferences);
            Arc::new(move || preferences.selected_address())
        };
        let preference_flag = |read: fn(&PreferencesState) -> bool| -> FlagSource {
            let preferences = Arc::clone(&preferences);
            Arc::new(move || read(&preferences.state()))
        };

        // =====================================================================
        // PHASE 2: Network
        // =====================================================================
        info!("Phase 2: Network");
        let network = NetworkController::new(
            messenger(bus, ControllerName::Network, &[], &[])?,
            Arc::clone(&services.provider_factory),
            initial.network.clone().unwrap_or_default(),
            config.network.infura_project_id.clone(),
        );
        network.initialize_provider().await?;
        let provider = network.provider_source();
        let chain_id = network.chain_id_source();
        let current_chain = network.current_chain_id();

        // =====================================================================
        // PHASE 3: Assets, rates, gas and phishing
        // =====================================================================
        info!("Phase 3: Assets and market data");
        let assets_contract = AssetsContractController::new(Arc::clone(&provider), current_chain);
        let nft = NftController::new(
            messenger(bus, ControllerName::Nft, &[], &[])?,
            Arc::clone(&chain_id),
            Arc::clone(&selected_address),
            NftState::default(),
        );
        let tokens = TokensController::new(
            messenger(bus, ControllerName::Tokens, &[actions::APPROVAL_ADD_REQUEST], &[])?,
            Arc::clone(&chain_id),
            Arc::clone(&selected_address),
            TokensState::default(),
        );
        let token_list = TokenListController::new(
            messenger(bus, ControllerName::TokenList, &[], &[])?,
            Arc::clone(&services.token_lists),
            Arc::clone(&chain_id),
            TokenListState::default(),
        );
        let currency_rate = CurrencyRateController::new(
            messenger(bus, ControllerName::CurrencyRate, &[], &[events::NETWORK_DID_CHANGE])?,
            Arc::clone(&services.prices),
            initial.currency_rate.clone().unwrap_or_default(),
        )?;
        currency_rate.start().await;

        let eip1559: FlagSource = {
            let network = Arc::clone(&network);
            Arc::new(move || network.state().network_details.eip1559 == Some(true))
        };
        let gas_fee = GasFeeController::new(
            messenger(bus, ControllerName::GasFee, &[], &[])?,
            Arc::clone(&provider),
            eip1559,
        );
        let phishing = PhishingController::new(
            messenger(bus, ControllerName::Phishing, &[], &[])?,
            Arc::clone(&services.phishing_lists),
            PhishingState::default(),
        )?;
        phishing.maybe_update_state().await;

        // =====================================================================
        // PHASE 4: Keys, permissions and snaps
        // =====================================================================
        info!("Phase 4: Keyring, permissions and snaps");
        let hooks = {
            let update = Arc::clone(&preferences);
            let select = Arc::clone(&preferences);
            let remove = Arc::clone(&preferences);
            KeyringHooks {
                update_identities: Arc::new(move |addresses: &[Address]| update.update_identities(addresses)),
                set_selected_address: Arc::new(move |address: &Address| select.set_selected_address(address.clone())),
                remove_identity: Arc::new(move |address: &Address| remove.remove_identity(address)),
            }
        };
        let keyring = KeyringController::new(
            messenger(bus, ControllerName::Keyring, &[], &[])?,
            hooks,
            config.keyring.kdf,
            initial_keyring_state.unwrap_or_default(),
        )?;
        let permission = PermissionController::new(
            messenger(
                bus,
                ControllerName::Permission,
                &[actions::APPROVAL_ADD_REQUEST],
                &[events::KEYRING_ACCOUNT_REMOVED],
            )?,
            PermissionState::default(),
        )?;
        let subject_metadata = SubjectMetadataController::new(
            messenger(bus, ControllerName::SubjectMetadata, &[actions::PERMISSION_HAS_PERMISSIONS], &[])?,
            DEFAULT_SUBJECT_CACHE_LIMIT,
            SubjectMetadataState::default(),
        );
        let snap_execution = Arc::clone(&services.snap_execution);
        let snaps = SnapController::new(
            messenger(bus, ControllerName::Snap, &[actions::APPROVAL_ADD_REQUEST], &[])?,
            Arc::clone(&snap_execution),
            SnapState::default(),
        );

        // =====================================================================
        // PHASE 5: Balances, detection, transactions and signing
        // =====================================================================
        info!("Phase 5: Balances, transactions and signing");
        let identities: IdentitiesSource = {
            let preferences = Arc::clone(&preferences);
            Arc::new(move || preferences.state().identities.into_keys().collect())
        };
        let account_tracker = AccountTrackerController::new(
            messenger(bus, ControllerName::AccountTracker, &[], &[])?,
            Arc::clone(&provider),
            identities,
            current_chain,
            AccountTrackerState::default(),
        );
        let address_book = AddressBookController::new(
            messenger(bus, ControllerName::AddressBook, &[], &[])?,
            AddressBookState::default(),
        );
        let token_detection = TokenDetectionController::new(
            Arc::clone(&token_list),
            Arc::clone(&assets_contract),
            Arc::clone(&tokens),
            Arc::clone(&chain_id),
            Arc::clone(&selected_address),
            preference_flag(|p| p.use_token_detection),
        );
        let nft_detection = NftDetectionController::new(
            Arc::clone(&services.nfts),
            Arc::clone(&nft),
            Arc::clone(&chain_id),
            Arc::clone(&selected_address),
            preference_flag(|p| p.use_nft_detection),
        );
        let token_balances = TokenBalancesController::new(
            messenger(bus, ControllerName::TokenBalances, &[], &[])?,
            Arc::clone(&tokens),
            Arc::clone(&assets_contract),
            Arc::clone(&selected_address),
            config.polling.token_balances,
        );
        let token_rates = TokenRatesController::new(
            messenger(bus, ControllerName::TokenRates, &[], &[])?,
            Arc::clone(&tokens),
            Arc::clone(&services.prices),
            Arc::clone(&chain_id),
        );
        let transaction = TransactionController::new(
            messenger(bus, ControllerName::Transaction, &[actions::APPROVAL_ADD_REQUEST], &[])?,
            TransactionSources {
                provider: Arc::clone(&provider),
                chain_id: Arc::clone(&chain_id),
                selected_address: Arc::clone(&selected_address),
                incoming: Arc::clone(&services.incoming_transactions),
                show_incoming_transactions: preference_flag(|p| p.show_incoming_transactions),
            },
            TransactionState::default(),
        );
        let swaps = SwapsController::new(
            messenger(bus, ControllerName::Swaps, &[], &[])?,
            Arc::clone(&services.swaps_quotes),
            current_chain,
        );
        let logging = LoggingController::new(
            messenger(bus, ControllerName::Logging, &[], &[])?,
            LoggingState::default(),
        )?;
        let signature = SignatureController::new(
            messenger(
                bus,
                ControllerName::Signature,
                &[
                    actions::APPROVAL_ADD_REQUEST,
                    actions::KEYRING_SIGN_MESSAGE,
                    actions::KEYRING_SIGN_PERSONAL_MESSAGE,
                    actions::KEYRING_SIGN_TYPED_MESSAGE,
                    actions::LOGGING_ADD,
                ],
                &[],
            )?,
            Arc::clone(&chain_id),
            preference_flag(|p| p.disabled_rpc_methods.eth_sign),
        );

        // =====================================================================
        // PHASE 6: Security alerts
        // =====================================================================
        let security = if config.security.alerts_enabled {
            info!("Phase 6: Security alerts");
            let ppom = messenger(bus, ControllerName::Security, &[actions::PHISHING_TEST_ORIGIN], &[])
                .and_then(|m| {
                    PpomController::new(m, Arc::clone(&chain_id), config.security.ppom_config())
                        .map_err(EngineError::SecurityController)
                });
            match ppom {
                Ok(ppom) => Some(ppom),
                Err(e) => {
                    error!(error = %e, "Security alerts controller failed, aborting engine construction");
                    return Err(e);
                }
            }
        } else {
            None
        };

        let context = Self {
            approval,
            preferences,
            network,
            assets_contract,
            nft,
            tokens,
            token_list,
            currency_rate,
            gas_fee,
            phishing,
            keyring,
            permission,
            subject_metadata,
            snap_execution,
            snaps,
            account_tracker,
            address_book,
            token_detection,
            nft_detection,
            token_balances,
            token_rates,
            transaction,
            swaps,
            signature,
            logging,
            security,
        };

        // =====================================================================
        // PHASE 7: Initial state
        // =====================================================================
        info!("Phase 7: Applying initial state");
        context.apply_initial_state(initial);

        info!(chain = %current_chain, security = context.security.is_some(), "Controllers built");
        Ok(context)
    }

    /// Apply caller-supplied state to controllers that accept it.
    pub fn apply_initial_state(&self, initial: &InitialState) {
        if let Some(state) = &initial.tokens {
            self.tokens.update(state.clone());
        }
        if let Some(state) = &initial.nft {
            self.nft.update(state.clone());
        }
        if let Some(state) = &initial.permission {
            self.permission.update(state.clone());
        }
        if let Some(state) = &initial.subject_metadata {
            self.subject_metadata.update(state.clone());
        }
        if let Some(state) = &initial.snaps {
            self.snaps.update(state.clone());
        }
        if let Some(state) = &initial.account_tracker {
            self.account_tracker.update(state.clone());
        }
        if let Some(state) = &initial.address_book {
            self.address_book.update(state.clone());
        }
        if let Some(state) = &initial.token_balances {
            self.token_balances.update(state.clone());
        }
        if let Some(state) = &initial.token_rates {
            self.token_rates.update(state.clone());
        }
        if let Some(state) = &initial.transaction {
            self.transaction.update(state.clone());
        }
        if let Some(state) = &initial.logging {
            self.logging.update(state.clone());
        }
    }
}
