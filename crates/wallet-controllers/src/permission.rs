//! # Permission Controller
//!
//! Tracks which dapp origins may see which accounts. The only permission is
//! `eth_accounts`, narrowed by a `restrictReturnedAccounts` caveat listing
//! the exposed addresses.
//!
//! Accounts removed from the keyring are dropped from every caveat; a
//! permission left with no accounts is revoked, and a subject left with no
//! permissions is forgotten.

use crate::approval::AddApprovalRequest;
use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{
    actions, events, ActionResponse, ControllerAction, ControllerEvent, ControllerMessenger, ControllerName,
    StateSlice,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_bus::{ActionHandler, BusAction};
use shared_types::{now_millis, Address, ApprovalType};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

pub const ETH_ACCOUNTS: &str = "eth_accounts";
pub const RESTRICT_RETURNED_ACCOUNTS: &str = "restrictReturnedAccounts";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caveat {
    #[serde(rename = "type")]
    pub caveat_type: String,
    pub value: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    pub parent_capability: String,
    pub invoker: String,
    pub caveats: Vec<Caveat>,
    pub date: u64,
}

impl Permission {
    fn eth_accounts(origin: &str, accounts: Vec<Address>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_capability: ETH_ACCOUNTS.to_string(),
            invoker: origin.to_string(),
            caveats: vec![Caveat {
                caveat_type: RESTRICT_RETURNED_ACCOUNTS.to_string(),
                value: accounts,
            }],
            date: now_millis(),
        }
    }

    fn accounts(&self) -> &[Address] {
        self.caveats
            .iter()
            .find(|c| c.caveat_type == RESTRICT_RETURNED_ACCOUNTS)
            .map(|c| c.value.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub origin: String,
    pub permissions: BTreeMap<String, Permission>,
}

/// Permission state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionState {
    pub subjects: BTreeMap<String, Subject>,
}

impl ControllerState for PermissionState {
    const NAME: ControllerName = ControllerName::Permission;

    fn into_slice(self) -> StateSlice {
        StateSlice::Permission(self)
    }
}

pub struct PermissionController {
    base: BaseController<PermissionState>,
}

impl PermissionController {
    /// Create the controller, register its bus actions and follow account
    /// removals.
    ///
    /// The messenger must allow `ApprovalController:addRequest` and
    /// `KeyringController:accountRemoved`.
    pub fn new(messenger: Arc<ControllerMessenger>, initial: PermissionState) -> ControllerResult<Arc<Self>> {
        let controller = Arc::new(Self {
            base: BaseController::new(Arc::clone(&messenger), initial),
        });

        let handler: Arc<dyn ActionHandler<ControllerAction>> = Arc::new(PermissionActions {
            controller: Arc::downgrade(&controller),
        });
        for action in [actions::PERMISSION_HAS_PERMISSIONS, actions::PERMISSION_GET_PERMITTED_ACCOUNTS] {
            messenger.register_action_handler(action, Arc::clone(&handler))?;
        }

        let weak = Arc::downgrade(&controller);
        messenger.subscribe(
            events::KEYRING_ACCOUNT_REMOVED,
            Arc::new(move |event: &ControllerEvent| {
                if let (ControllerEvent::KeyringAccountRemoved(address), Some(controller)) = (event, weak.upgrade()) {
                    controller.remove_account_from_all(address);
                }
            }),
        )?;

        Ok(controller)
    }

    #[must_use]
    pub fn state(&self) -> PermissionState {
        self.base.state()
    }

    /// Expose `accounts` to `origin`, replacing any earlier grant.
    pub fn grant_permissions(&self, origin: &str, accounts: Vec<Address>) {
        info!(origin, count = accounts.len(), "Granting eth_accounts");
        let permission = Permission::eth_accounts(origin, accounts);
        self.base.update(|state| {
            state
                .subjects
                .entry(origin.to_string())
                .or_insert_with(|| Subject {
                    origin: origin.to_string(),
                    permissions: BTreeMap::new(),
                })
                .permissions
                .insert(ETH_ACCOUNTS.to_string(), permission);
        });
    }

    #[must_use]
    pub fn has_permissions(&self, origin: &str) -> bool {
        self.base
            .read(|s| s.subjects.get(origin).is_some_and(|subject| !subject.permissions.is_empty()))
    }

    #[must_use]
    pub fn get_permitted_accounts(&self, origin: &str) -> Vec<Address> {
        self.base.read(|s| {
            s.subjects
                .get(origin)
                .and_then(|subject| subject.permissions.get(ETH_ACCOUNTS))
                .map(|p| p.accounts().to_vec())
                .unwrap_or_default()
        })
    }

    /// Ask the user to expose accounts to `origin`.
    ///
    /// Origins that already hold a grant get their accounts back without a
    /// prompt. The approval may answer with `{"accounts": [...]}` to narrow
    /// the selection; otherwise `suggested` is granted.
    pub async fn request_accounts_permission(
        &self,
        origin: &str,
        suggested: Vec<Address>,
    ) -> ControllerResult<Vec<Address>> {
        let existing = self.get_permitted_accounts(origin);
        if !existing.is_empty() {
            return Ok(existing);
        }

        let outcome = self
            .base
            .messenger()
            .call(ControllerAction::AddApprovalRequest(AddApprovalRequest::new(
                origin,
                ApprovalType::RequestPermissions,
                json!({ "permissions": { ETH_ACCOUNTS: {} }, "accounts": suggested }),
            )))
            .await?
            .into_approval()?;

        let accounts = match outcome.value.as_ref().and_then(|v| v.get("accounts")).cloned() {
            Some(chosen) => serde_json::from_value::<Vec<Address>>(chosen)
                .map_err(|e| ControllerError::InvalidParams(e.to_string()))?,
            None => suggested,
        };
        if accounts.is_empty() {
            return Err(ControllerError::InvalidParams("no accounts selected".into()));
        }
        self.grant_permissions(origin, accounts.clone());
        Ok(accounts)
    }

    /// Forget every permission of `origin`.
    pub fn revoke_all_permissions(&self, origin: &str) -> bool {
        let removed = self.base.update(|state| state.subjects.remove(origin).is_some());
        if removed {
            info!(origin, "Permissions revoked");
        }
        removed
    }

    /// Drop `address` from every caveat.
    pub fn remove_account_from_all(&self, address: &Address) {
        self.base.update(|state| {
            for subject in state.subjects.values_mut() {
                for permission in subject.permissions.values_mut() {
                    for caveat in &mut permission.caveats {
                        caveat.value.retain(|a| a != address);
                    }
                }
                subject.permissions.retain(|_, p| !p.accounts().is_empty());
            }
            state.subjects.retain(|_, s| !s.permissions.is_empty());
        });
        debug!(address = %address, "Account removed from permissions");
    }

    pub fn clear_state(&self) {
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: PermissionState) {
        self.base.replace(next);
    }
}

struct PermissionActions {
    controller: Weak<PermissionController>,
}

#[async_trait]
impl ActionHandler<ControllerAction> for PermissionActions {
    async fn handle(&self, action: ControllerAction) -> Result<ActionResponse, ControllerError> {
        let controller = self
            .controller
            .upgrade()
            .ok_or_else(|| ControllerError::NotFound(ControllerName::Permission.as_str().into()))?;
        match action {
            ControllerAction::HasPermissions { origin } => Ok(ActionResponse::Bool(controller.has_permissions(&origin))),
            ControllerAction::GetPermittedAccounts { origin } => {
                Ok(ActionResponse::Accounts(controller.get_permitted_accounts(&origin)))
            }
            other => Err(ControllerError::UnexpectedResponse(other.action_type())),
        }
    }
}

/// JSON shape returned by `wallet_getPermissions`.
#[must_use]
pub fn permissions_to_json(subject: Option<&Subject>) -> Value {
    let permissions: Vec<&Permission> = subject.map(|s| s.permissions.values().collect()).unwrap_or_default();
    json!(permissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{AcceptOptions, ApprovalConfig, ApprovalController};
    use crate::messaging::ControllerBus;
    use crate::test_support::{messenger_for, messenger_on};
    use shared_bus::EventPublisher;

    fn setup() -> (Arc<ControllerBus>, Arc<ApprovalController>, Arc<PermissionController>) {
        let (bus, approval_messenger) = messenger_for(ControllerName::Approval, &[], &[]);
        let approvals = ApprovalController::new(approval_messenger, ApprovalConfig::default()).unwrap();
        let permissions = PermissionController::new(
            messenger_on(
                &bus,
                ControllerName::Permission,
                &[actions::APPROVAL_ADD_REQUEST],
                &[events::KEYRING_ACCOUNT_REMOVED],
            ),
            PermissionState::default(),
        )
        .unwrap();
        (bus, approvals, permissions)
    }

    #[test]
    fn test_grant_and_revoke() {
        let (_bus, _approvals, permissions) = setup();
        let account = Address::from_bytes([1; 20]);

        permissions.grant_permissions("https://dapp.io", vec![account.clone()]);
        assert!(permissions.has_permissions("https://dapp.io"));
        assert_eq!(permissions.get_permitted_accounts("https://dapp.io"), vec![account]);

        assert!(permissions.revoke_all_permissions("https://dapp.io"));
        assert!(!permissions.has_permissions("https://dapp.io"));
        assert!(!permissions.revoke_all_permissions("https://dapp.io"));
    }

    #[test]
    fn test_account_removal_event_prunes_subjects() {
        let (bus, _approvals, permissions) = setup();
        let a = Address::from_bytes([1; 20]);
        let b = Address::from_bytes([2; 20]);
        permissions.grant_permissions("one.io", vec![a.clone(), b.clone()]);
        permissions.grant_permissions("two.io", vec![a.clone()]);

        bus.publish(ControllerEvent::KeyringAccountRemoved(a));

        assert_eq!(permissions.get_permitted_accounts("one.io"), vec![b]);
        assert!(!permissions.has_permissions("two.io"));
    }

    #[tokio::test]
    async fn test_request_permission_uses_approved_accounts() {
        let (_bus, approvals, permissions) = setup();
        let a = Address::from_bytes([1; 20]);
        let b = Address::from_bytes([2; 20]);

        let requester = {
            let permissions = permissions.clone();
            let suggested = vec![a.clone(), b.clone()];
            tokio::spawn(async move { permissions.request_accounts_permission("dapp.io", suggested).await })
        };
        let id = loop {
            if let Some(id) = approvals.state().pending_approvals.keys().next().cloned() {
                break id;
            }
            tokio::task::yield_now().await;
        };
        approvals
            .accept(&id, Some(json!({ "accounts": [b.as_str()] })), AcceptOptions::default())
            .await
            .unwrap();

        assert_eq!(requester.await.unwrap().unwrap(), vec![b.clone()]);
        assert_eq!(permissions.get_permitted_accounts("dapp.io"), vec![b]);
    }
}
