//! # Address Book Controller

use crate::base::{BaseController, ControllerState};
use crate::messaging::{ControllerMessenger, ControllerName, StateSlice};
use serde::{Deserialize, Serialize};
use shared_types::{Address, ChainId};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBookEntry {
    pub address: Address,
    pub name: String,
    pub chain_id: ChainId,
    #[serde(default)]
    pub memo: String,
}

/// Address book state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBookState {
    pub address_book: BTreeMap<ChainId, BTreeMap<Address, AddressBookEntry>>,
}

impl ControllerState for AddressBookState {
    const NAME: ControllerName = ControllerName::AddressBook;

    fn into_slice(self) -> StateSlice {
        StateSlice::AddressBook(self)
    }
}

pub struct AddressBookController {
    base: BaseController<AddressBookState>,
}

impl AddressBookController {
    pub fn new(messenger: Arc<ControllerMessenger>, initial: AddressBookState) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
        })
    }

    #[must_use]
    pub fn state(&self) -> AddressBookState {
        self.base.state()
    }

    /// Add or rename a contact. An empty name is refused.
    pub fn set(&self, address: Address, name: &str, chain_id: ChainId, memo: &str) -> bool {
        if name.trim().is_empty() {
            return false;
        }
        let entry = AddressBookEntry {
            address: address.clone(),
            name: name.to_string(),
            chain_id,
            memo: memo.to_string(),
        };
        self.base.update(|state| {
            state
                .address_book
                .entry(chain_id)
                .or_default()
                .insert(address, entry);
        });
        true
    }

    /// Remove a contact. Returns false when it did not exist.
    pub fn delete(&self, chain_id: ChainId, address: &Address) -> bool {
        self.base.update(|state| {
            let Some(book) = state.address_book.get_mut(&chain_id) else {
                return false;
            };
            let removed = book.remove(address).is_some();
            if book.is_empty() {
                state.address_book.remove(&chain_id);
            }
            removed
        })
    }

    pub fn clear(&self) {
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: AddressBookState) {
        self.base.replace(next);
    }
}
