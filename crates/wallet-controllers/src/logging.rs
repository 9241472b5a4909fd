//! # Logging Controller
//!
//! User-visible activity log. Signature requests are recorded here at each
//! stage of their lifecycle.

use crate::base::{BaseController, ControllerState};
use crate::errors::ControllerError;
use crate::messaging::{
    actions, ActionResponse, ControllerAction, ControllerMessenger, ControllerName, StateSlice,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_bus::{ActionHandler, BusAction};
use shared_types::now_millis;
use std::sync::{Arc, Weak};

/// Stage of a signing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SigningStage {
    Proposed,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LogType {
    #[serde(rename = "GenericLog")]
    Generic(String),
    #[serde(rename = "EthSignLog")]
    EthSign {
        signing_method: String,
        stage: SigningStage,
        params: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub timestamp: u64,
    pub log: LogType,
}

impl LogEntry {
    pub fn new(log: LogType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now_millis(),
            log,
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(LogType::Generic(message.into()))
    }

    pub fn signing(method: impl Into<String>, stage: SigningStage, params: Value) -> Self {
        Self::new(LogType::EthSign {
            signing_method: method.into(),
            stage,
            params,
        })
    }
}

/// Logging state slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingState {
    pub logs: Vec<LogEntry>,
}

impl ControllerState for LoggingState {
    const NAME: ControllerName = ControllerName::Logging;

    fn into_slice(self) -> StateSlice {
        StateSlice::Logging(self)
    }
}

pub struct LoggingController {
    base: BaseController<LoggingState>,
}

impl LoggingController {
    /// Create the controller and register `LoggingController:add`.
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        initial: LoggingState,
    ) -> Result<Arc<Self>, ControllerError> {
        let controller = Arc::new(Self {
            base: BaseController::new(Arc::clone(&messenger), initial),
        });
        messenger.register_action_handler(
            actions::LOGGING_ADD,
            Arc::new(LoggingActions {
                controller: Arc::downgrade(&controller),
            }),
        )?;
        Ok(controller)
    }

    #[must_use]
    pub fn state(&self) -> LoggingState {
        self.base.state()
    }

    pub fn add(&self, entry: LogEntry) {
        self.base.update(|state| state.logs.push(entry));
    }

    pub fn clear(&self) {
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: LoggingState) {
        self.base.replace(next);
    }
}

struct LoggingActions {
    controller: Weak<LoggingController>,
}

#[async_trait]
impl ActionHandler<ControllerAction> for LoggingActions {
    async fn handle(&self, action: ControllerAction) -> Result<ActionResponse, ControllerError> {
        let controller = self
            .controller
            .upgrade()
            .ok_or_else(|| ControllerError::NotFound(ControllerName::Logging.as_str().into()))?;
        match action {
            ControllerAction::AddLog(entry) => {
                controller.add(entry);
                Ok(ActionResponse::Unit)
            }
            other => Err(ControllerError::UnexpectedResponse(other.action_type())),
        }
    }
}
