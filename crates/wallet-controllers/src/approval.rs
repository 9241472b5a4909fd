//! # Approval Controller
//!
//! User-consent gate. A requester adds an approval and waits; the UI (or the
//! engine on its behalf) accepts or rejects it exactly once.
//!
//! ## Lifecycle
//!
//! ```text
//! add_request ──→ pending ──accept──→ resolved(value) ──→ removed
//!                    │
//!                    └────reject───→ resolved(error) ──→ removed
//! ```
//!
//! A second `accept`/`reject` for the same id fails with
//! [`ApprovalError::NotFound`].
//!
//! Unless its type is excluded, an origin may have only one pending approval
//! of a given type at a time.

use crate::base::{BaseController, ControllerState};
use crate::errors::{ApprovalError, ControllerError};
use crate::messaging::{
    actions, ActionResponse, ControllerAction, ControllerMessenger, ControllerName, StateSlice,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use shared_bus::{ActionHandler, BusAction};
use shared_types::{now_millis, ApprovalRequest, ApprovalType, RpcError};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Types that never count against the one-pending-per-origin limit.
pub fn default_rate_limit_exclusions() -> HashSet<ApprovalType> {
    [
        ApprovalType::EthSign,
        ApprovalType::PersonalSign,
        ApprovalType::EthSignTypedData,
        ApprovalType::Transaction,
        ApprovalType::WatchAsset,
    ]
    .into_iter()
    .collect()
}

/// Approval state slice.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalState {
    pub pending_approvals: BTreeMap<String, ApprovalRequest>,
    pub pending_approval_count: usize,
}

impl ControllerState for ApprovalState {
    const NAME: ControllerName = ControllerName::Approval;

    fn into_slice(self) -> StateSlice {
        StateSlice::Approval(self)
    }
}

/// Parameters of a new approval.
#[derive(Debug, Clone)]
pub struct AddApprovalRequest {
    /// Caller-chosen id; a UUID is generated when absent.
    pub id: Option<String>,
    pub origin: String,
    pub approval_type: ApprovalType,
    pub request_data: Value,
    /// The requester will report a final result after acceptance.
    pub expects_result: bool,
}

impl AddApprovalRequest {
    pub fn new(origin: impl Into<String>, approval_type: ApprovalType, request_data: Value) -> Self {
        Self {
            id: None,
            origin: origin.into(),
            approval_type,
            request_data,
            expects_result: false,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn expecting_result(mut self) -> Self {
        self.expects_result = true;
        self
    }
}

/// Lets the requester report the final result of an accepted approval.
#[derive(Debug)]
pub struct ResultCallbacks {
    sender: Option<oneshot::Sender<Result<Value, RpcError>>>,
}

impl ResultCallbacks {
    pub fn success(mut self, value: Value) {
        if let Some(tx) = self.sender.take() {
            let _ = tx.send(Ok(value));
        }
    }

    pub fn error(mut self, error: RpcError) {
        if let Some(tx) = self.sender.take() {
            let _ = tx.send(Err(error));
        }
    }
}

/// What the requester receives when its approval is accepted.
#[derive(Debug)]
pub struct ApprovalOutcome {
    /// Data supplied by the accepting side.
    pub value: Option<Value>,
    /// Present when the accepting side waits for the final result.
    pub result_callbacks: Option<ResultCallbacks>,
}

impl ApprovalOutcome {
    /// Report success to a waiting acceptor, if any.
    pub fn report_success(&mut self, value: Value) {
        if let Some(callbacks) = self.result_callbacks.take() {
            callbacks.success(value);
        }
    }

    /// Report failure to a waiting acceptor, if any.
    pub fn report_error(&mut self, error: RpcError) {
        if let Some(callbacks) = self.result_callbacks.take() {
            callbacks.error(error);
        }
    }
}

/// Handle held by the requester while its approval is pending.
#[derive(Debug)]
pub struct PendingApproval {
    pub id: String,
    receiver: oneshot::Receiver<Result<ApprovalOutcome, ApprovalError>>,
}

impl PendingApproval {
    /// Wait until the approval is resolved.
    pub async fn wait(self) -> Result<ApprovalOutcome, ApprovalError> {
        self.receiver.await.map_err(|_| ApprovalError::Abandoned)?
    }
}

/// Options for [`ApprovalController::accept`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptOptions {
    /// Wait for the requester to report the final result.
    pub wait_for_result: bool,
    /// Keep the approval visible in state until the result arrives.
    pub delete_after_result: bool,
}

/// Result of an accepted approval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptResult {
    /// Final result reported by the requester, when waited for.
    pub value: Option<Value>,
}

struct PendingEntry {
    origin: String,
    approval_type: ApprovalType,
    expects_result: bool,
    sender: oneshot::Sender<Result<ApprovalOutcome, ApprovalError>>,
}

/// Configuration for [`ApprovalController`].
#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    pub types_excluded_from_rate_limiting: HashSet<ApprovalType>,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            types_excluded_from_rate_limiting: default_rate_limit_exclusions(),
        }
    }
}

/// Approval controller.
pub struct ApprovalController {
    base: BaseController<ApprovalState>,
    pending: Mutex<HashMap<String, PendingEntry>>,
    config: ApprovalConfig,
}

impl ApprovalController {
    /// Create the controller and register its bus actions.
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        config: ApprovalConfig,
    ) -> Result<Arc<Self>, ControllerError> {
        let controller = Arc::new(Self {
            base: BaseController::new(Arc::clone(&messenger), ApprovalState::default()),
            pending: Mutex::new(HashMap::new()),
            config,
        });

        let handler: Arc<dyn ActionHandler<ControllerAction>> = Arc::new(ApprovalActions {
            controller: Arc::downgrade(&controller),
        });
        for action in [
            actions::APPROVAL_ADD_REQUEST,
            actions::APPROVAL_HAS_REQUEST,
            actions::APPROVAL_ACCEPT_REQUEST,
            actions::APPROVAL_REJECT_REQUEST,
        ] {
            messenger.register_action_handler(action, Arc::clone(&handler))?;
        }

        Ok(controller)
    }

    #[must_use]
    pub fn state(&self) -> ApprovalState {
        self.base.state()
    }

    /// Add a pending approval.
    pub fn add_request(&self, request: AddApprovalRequest) -> Result<PendingApproval, ApprovalError> {
        let id = request
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.contains_key(&id) {
                return Err(ApprovalError::DuplicateId(id));
            }
            let rate_limited = !self
                .config
                .types_excluded_from_rate_limiting
                .contains(&request.approval_type);
            if rate_limited
                && pending.values().any(|p| {
                    p.origin == request.origin && p.approval_type == request.approval_type
                })
            {
                return Err(ApprovalError::AlreadyPending {
                    origin: request.origin,
                    approval_type: request.approval_type,
                });
            }
            pending.insert(
                id.clone(),
                PendingEntry {
                    origin: request.origin.clone(),
                    approval_type: request.approval_type.clone(),
                    expects_result: request.expects_result,
                    sender: tx,
                },
            );
        }

        let stored = ApprovalRequest {
            id: id.clone(),
            origin: request.origin,
            request_type: request.approval_type,
            request_data: request.request_data,
            time: now_millis(),
            expects_result: request.expects_result,
        };
        debug!(id = %id, origin = %stored.origin, kind = %stored.request_type, "Approval added");
        self.base.update(|state| {
            state.pending_approvals.insert(id.clone(), stored);
            state.pending_approval_count = state.pending_approvals.len();
        });

        Ok(PendingApproval { id, receiver: rx })
    }

    /// Add an approval and wait for its resolution.
    pub async fn add_and_wait(&self, request: AddApprovalRequest) -> Result<ApprovalOutcome, ApprovalError> {
        self.add_request(request)?.wait().await
    }

    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Whether `origin` has a pending approval of `approval_type`.
    #[must_use]
    pub fn has_pending_for(&self, origin: &str, approval_type: &ApprovalType) -> bool {
        self.pending
            .lock()
            .values()
            .any(|p| p.origin == origin && &p.approval_type == approval_type)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Accept a pending approval.
    pub async fn accept(
        &self,
        id: &str,
        value: Option<Value>,
        options: AcceptOptions,
    ) -> Result<AcceptResult, ApprovalError> {
        let entry = self
            .pending
            .lock()
            .remove(id)
            .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;

        let waits = options.wait_for_result && entry.expects_result;
        let keep_visible = waits && options.delete_after_result;
        if !keep_visible {
            self.remove_from_state(id);
        }

        let (result_tx, result_rx) = oneshot::channel();
        let outcome = ApprovalOutcome {
            value,
            result_callbacks: waits.then(|| ResultCallbacks {
                sender: Some(result_tx),
            }),
        };
        if entry.sender.send(Ok(outcome)).is_err() {
            warn!(id, "Approval requester went away before acceptance");
        }
        info!(id, "Approval accepted");

        if !waits {
            return Ok(AcceptResult::default());
        }

        let reported = result_rx.await;
        if keep_visible {
            self.remove_from_state(id);
        }
        match reported {
            Ok(Ok(value)) => Ok(AcceptResult { value: Some(value) }),
            Ok(Err(error)) => Err(ApprovalError::ResultFailed(error)),
            // Requester finished without reporting.
            Err(_) => Ok(AcceptResult::default()),
        }
    }

    /// Reject a pending approval.
    pub fn reject(&self, id: &str, error: RpcError) -> Result<(), ApprovalError> {
        let entry = self
            .pending
            .lock()
            .remove(id)
            .ok_or_else(|| ApprovalError::NotFound(id.to_string()))?;
        self.remove_from_state(id);
        info!(id, code = error.code, "Approval rejected");
        let _ = entry.sender.send(Err(ApprovalError::Rejected(error)));
        Ok(())
    }

    /// Reject every pending approval with `error`.
    pub fn clear(&self, error: RpcError) {
        let drained: Vec<(String, PendingEntry)> = self.pending.lock().drain().collect();
        for (_, entry) in drained {
            let _ = entry.sender.send(Err(ApprovalError::Rejected(error.clone())));
        }
        self.base.reset();
    }

    fn remove_from_state(&self, id: &str) {
        self.base.update(|state| {
            state.pending_approvals.remove(id);
            state.pending_approval_count = state.pending_approvals.len();
        });
    }
}

struct ApprovalActions {
    controller: Weak<ApprovalController>,
}

#[async_trait]
impl ActionHandler<ControllerAction> for ApprovalActions {
    async fn handle(&self, action: ControllerAction) -> Result<ActionResponse, ControllerError> {
        let controller = self
            .controller
            .upgrade()
            .ok_or_else(|| ControllerError::NotFound(ControllerName::Approval.as_str().into()))?;
        match action {
            ControllerAction::AddApprovalRequest(request) => {
                let pending = controller.add_request(request)?;
                // Do not hold the controller alive while a human decides.
                drop(controller);
                Ok(ActionResponse::Approval(pending.wait().await?))
            }
            ControllerAction::HasApprovalRequest { id } => Ok(ActionResponse::Bool(controller.has(&id))),
            ControllerAction::AcceptApprovalRequest { id, value } => {
                controller.accept(&id, value, AcceptOptions::default()).await?;
                Ok(ActionResponse::Unit)
            }
            ControllerAction::RejectApprovalRequest { id, error } => {
                controller.reject(&id, error)?;
                Ok(ActionResponse::Unit)
            }
            other => Err(ControllerError::UnexpectedResponse(other.action_type())),
        }
    }
}
