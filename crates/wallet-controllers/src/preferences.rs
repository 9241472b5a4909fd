//! # Preferences Controller
//!
//! Account identities, the selected address and display options.

use crate::base::{BaseController, ControllerState};
use crate::messaging::{ControllerMessenger, ControllerName, StateSlice};
use serde::{Deserialize, Serialize};
use shared_types::{now_millis, Address};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_IPFS_GATEWAY: &str = "https://cloudflare-ipfs.com/ipfs/";

/// A named account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub address: Address,
    pub name: String,
    pub imported_time: Option<u64>,
}

/// RPC methods the user can toggle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisabledRpcMethodPreferences {
    pub eth_sign: bool,
}

/// Preferences state slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesState {
    pub identities: BTreeMap<Address, Identity>,
    pub lost_identities: BTreeMap<Address, Identity>,
    pub selected_address: Option<Address>,
    pub use_token_detection: bool,
    pub use_nft_detection: bool,
    pub display_nft_media: bool,
    pub ipfs_gateway: String,
    pub is_ipfs_gateway_enabled: bool,
    pub show_incoming_transactions: bool,
    pub security_alerts_enabled: bool,
    pub disabled_rpc_methods: DisabledRpcMethodPreferences,
}

impl Default for PreferencesState {
    fn default() -> Self {
        Self {
            identities: BTreeMap::new(),
            lost_identities: BTreeMap::new(),
            selected_address: None,
            use_token_detection: true,
            use_nft_detection: false,
            display_nft_media: true,
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
            is_ipfs_gateway_enabled: true,
            show_incoming_transactions: true,
            security_alerts_enabled: false,
            disabled_rpc_methods: DisabledRpcMethodPreferences::default(),
        }
    }
}

impl ControllerState for PreferencesState {
    const NAME: ControllerName = ControllerName::Preferences;

    fn into_slice(self) -> StateSlice {
        StateSlice::Preferences(self)
    }
}

pub struct PreferencesController {
    base: BaseController<PreferencesState>,
}

impl PreferencesController {
    pub fn new(messenger: Arc<ControllerMessenger>, initial: PreferencesState) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
        })
    }

    #[must_use]
    pub fn state(&self) -> PreferencesState {
        self.base.state()
    }

    #[must_use]
    pub fn selected_address(&self) -> Option<Address> {
        self.base.read(|s| s.selected_address.clone())
    }

    /// Replace the identity set with `addresses`.
    ///
    /// Existing names are kept; new accounts are named `Account N`. When the
    /// selected address is no longer present the first address is selected.
    pub fn update_identities(&self, addresses: &[Address]) {
        self.base.update(|state| {
            let previous = std::mem::take(&mut state.identities);
            for (i, address) in addresses.iter().enumerate() {
                let identity = previous.get(address).cloned().unwrap_or_else(|| Identity {
                    address: address.clone(),
                    name: format!("Account {}", i + 1),
                    imported_time: Some(now_millis()),
                });
                state.identities.insert(address.clone(), identity);
            }
            for (address, identity) in previous {
                if !state.identities.contains_key(&address) {
                    state.lost_identities.insert(address, identity);
                }
            }
            let selected_still_present = state
                .selected_address
                .as_ref()
                .is_some_and(|a| state.identities.contains_key(a));
            if !selected_still_present {
                state.selected_address = addresses.first().cloned();
            }
        });
        debug!(count = addresses.len(), "Identities updated");
    }

    pub fn set_selected_address(&self, address: Address) {
        self.base.update(|state| state.selected_address = Some(address));
    }

    pub fn remove_identity(&self, address: &Address) {
        self.base.update(|state| {
            state.identities.remove(address);
            if state.selected_address.as_ref() == Some(address) {
                state.selected_address = state.identities.keys().next().cloned();
            }
        });
    }

    pub fn set_account_label(&self, address: &Address, label: impl Into<String>) {
        let label = label.into();
        self.base.update(|state| {
            if let Some(identity) = state.identities.get_mut(address) {
                identity.name = label;
            }
        });
    }

    pub fn set_use_token_detection(&self, enabled: bool) {
        self.base.update(|state| state.use_token_detection = enabled);
    }

    pub fn set_use_nft_detection(&self, enabled: bool) {
        self.base.update(|state| state.use_nft_detection = enabled);
    }

    pub fn set_display_nft_media(&self, enabled: bool) {
        self.base.update(|state| state.display_nft_media = enabled);
    }

    pub fn set_show_incoming_transactions(&self, enabled: bool) {
        self.base.update(|state| state.show_incoming_transactions = enabled);
    }

    pub fn set_security_alerts_enabled(&self, enabled: bool) {
        self.base.update(|state| state.security_alerts_enabled = enabled);
    }

    pub fn set_disabled_rpc_method_preference(&self, eth_sign_enabled: bool) {
        self.base
            .update(|state| state.disabled_rpc_methods.eth_sign = eth_sign_enabled);
    }

    pub fn set_ipfs_gateway(&self, gateway: impl Into<String>) {
        let gateway = gateway.into();
        self.base.update(|state| state.ipfs_gateway = gateway);
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: PreferencesState) {
        self.base.replace(next);
    }
}
