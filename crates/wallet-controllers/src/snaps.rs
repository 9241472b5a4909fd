//! # Snap Controller
//!
//! Installs snaps (sandboxed wallet extensions) after user approval and
//! routes requests to them through an [`ExecutionService`].

use crate::approval::AddApprovalRequest;
use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerAction, ControllerMessenger, ControllerName, StateSlice};
use crate::ports::ExecutionService;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::{now_millis, ApprovalType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Approval type shown while a snap install is pending.
pub const INSTALL_APPROVAL: &str = "wallet_installSnap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapStatus {
    Installing,
    Running,
    Stopped,
    Crashed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snap {
    pub id: String,
    pub version: String,
    pub enabled: bool,
    pub blocked: bool,
    pub status: SnapStatus,
    pub installed_at: u64,
    pub installed_by: String,
}

/// Snap state slice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapState {
    pub snaps: BTreeMap<String, Snap>,
}

impl ControllerState for SnapState {
    const NAME: ControllerName = ControllerName::Snap;

    fn into_slice(self) -> StateSlice {
        StateSlice::Snap(self)
    }
}

/// `npm:<package>` or `local:<url>`.
#[must_use]
pub fn is_valid_snap_id(id: &str) -> bool {
    ["npm:", "local:"]
        .iter()
        .any(|prefix| id.strip_prefix(prefix).is_some_and(|rest| !rest.is_empty()))
}

pub struct SnapController {
    base: BaseController<SnapState>,
    execution: Arc<dyn ExecutionService>,
}

impl SnapController {
    /// The messenger must allow `ApprovalController:addRequest`.
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        execution: Arc<dyn ExecutionService>,
        initial: SnapState,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
            execution,
        })
    }

    #[must_use]
    pub fn state(&self) -> SnapState {
        self.base.state()
    }

    #[must_use]
    pub fn get(&self, snap_id: &str) -> Option<Snap> {
        self.base.read(|s| s.snaps.get(snap_id).cloned())
    }

    /// Install a snap once the user approves it.
    #[instrument(skip(self))]
    pub async fn install_snap(&self, origin: &str, snap_id: &str, version: &str) -> ControllerResult<Snap> {
        if !is_valid_snap_id(snap_id) {
            return Err(ControllerError::InvalidParams(format!("invalid snap id {snap_id}")));
        }
        if let Some(existing) = self.get(snap_id).filter(|s| s.version == version) {
            return Ok(existing);
        }

        self.base
            .messenger()
            .call(ControllerAction::AddApprovalRequest(AddApprovalRequest::new(
                origin,
                ApprovalType::Custom(INSTALL_APPROVAL.to_string()),
                json!({ "snapId": snap_id, "version": version }),
            )))
            .await?
            .into_approval()?;

        let snap = Snap {
            id: snap_id.to_string(),
            version: version.to_string(),
            enabled: true,
            blocked: false,
            status: SnapStatus::Stopped,
            installed_at: now_millis(),
            installed_by: origin.to_string(),
        };
        self.base.update(|state| {
            state.snaps.insert(snap.id.clone(), snap.clone());
        });
        info!(snap_id, version, "Snap installed");
        Ok(snap)
    }

    /// Send an RPC request to a snap, starting it if needed.
    pub async fn handle_request(&self, snap_id: &str, origin: &str, method: &str, params: Value) -> ControllerResult<Value> {
        let snap = self
            .get(snap_id)
            .ok_or_else(|| ControllerError::NotFound(format!("snap {snap_id}")))?;
        if snap.blocked {
            return Err(ControllerError::Disabled(format!("snap {snap_id} is blocked")));
        }
        if !snap.enabled {
            return Err(ControllerError::Disabled(format!("snap {snap_id} is disabled")));
        }
        if snap.status != SnapStatus::Running {
            self.set_status(snap_id, SnapStatus::Running);
        }

        let request = json!({ "origin": origin, "request": { "method": method, "params": params } });
        match self.execution.execute(snap_id, "onRpcRequest", request).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(snap_id, error = %e, "Snap request failed");
                self.set_status(snap_id, SnapStatus::Crashed);
                Err(e)
            }
        }
    }

    pub async fn stop_snap(&self, snap_id: &str) {
        self.execution.terminate(snap_id).await;
        self.set_status(snap_id, SnapStatus::Stopped);
    }

    pub fn enable_snap(&self, snap_id: &str) {
        self.base.update(|state| {
            if let Some(snap) = state.snaps.get_mut(snap_id) {
                snap.enabled = true;
            }
        });
    }

    pub async fn disable_snap(&self, snap_id: &str) {
        self.stop_snap(snap_id).await;
        self.base.update(|state| {
            if let Some(snap) = state.snaps.get_mut(snap_id) {
                snap.enabled = false;
            }
        });
    }

    pub async fn remove_snap(&self, snap_id: &str) -> bool {
        self.execution.terminate(snap_id).await;
        self.base.update(|state| state.snaps.remove(snap_id).is_some())
    }

    /// Stop every snap and forget them all.
    pub async fn clear_state(&self) {
        let ids: Vec<String> = self.base.read(|s| s.snaps.keys().cloned().collect());
        for id in ids {
            self.execution.terminate(&id).await;
        }
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: SnapState) {
        self.base.replace(next);
    }

    fn set_status(&self, snap_id: &str, status: SnapStatus) {
        self.base.update(|state| {
            if let Some(snap) = state.snaps.get_mut(snap_id) {
                snap.status = status;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InProcessExecutionService;
    use crate::approval::{AcceptOptions, ApprovalConfig, ApprovalController};
    use crate::messaging::actions;
    use crate::test_support::{messenger_for, messenger_on};

    #[test]
    fn test_snap_id_validation() {
        assert!(is_valid_snap_id("npm:@metamask/example"));
        assert!(is_valid_snap_id("local:http://localhost:8080"));
        assert!(!is_valid_snap_id("npm:"));
        assert!(!is_valid_snap_id("example"));
    }

    #[tokio::test]
    async fn test_install_then_request() {
        // Arrange
        let (bus, approval_messenger) = messenger_for(ControllerName::Approval, &[], &[]);
        let approvals = ApprovalController::new(approval_messenger, ApprovalConfig::default()).unwrap();
        let execution = Arc::new(
            InProcessExecutionService::default()
                .with_handler("npm:echo", |_method: &str, params: Value| Ok(params)),
        );
        let snaps = SnapController::new(
            messenger_on(&bus, ControllerName::Snap, &[actions::APPROVAL_ADD_REQUEST], &[]),
            execution,
            SnapState::default(),
        );

        // Act
        let installer = {
            let snaps = snaps.clone();
            tokio::spawn(async move { snaps.install_snap("dapp.io", "npm:echo", "1.0.0").await })
        };
        let id = loop {
            if let Some(id) = approvals.state().pending_approvals.keys().next().cloned() {
                break id;
            }
            tokio::task::yield_now().await;
        };
        approvals.accept(&id, None, AcceptOptions::default()).await.unwrap();
        installer.await.unwrap().unwrap();
        let reply = snaps
            .handle_request("npm:echo", "dapp.io", "hello", json!([1]))
            .await
            .unwrap();

        // Assert
        assert_eq!(reply["request"]["method"], "hello");
        assert_eq!(snaps.get("npm:echo").unwrap().status, SnapStatus::Running);

        snaps.disable_snap("npm:echo").await;
        assert!(snaps.handle_request("npm:echo", "dapp.io", "hello", json!([])).await.is_err());
    }
}
