//! Runs snaps as in-process handler functions.

use crate::errors::ControllerError;
use crate::ports::ExecutionService;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

type SnapHandler = Arc<dyn Fn(&str, Value) -> Result<Value, ControllerError> + Send + Sync>;

#[derive(Default)]
pub struct InProcessExecutionService {
    handlers: HashMap<String, SnapHandler>,
    running: RwLock<HashSet<String>>,
}

impl InProcessExecutionService {
    #[must_use]
    pub fn with_handler<F>(mut self, snap_id: &str, handler: F) -> Self
    where
        F: Fn(&str, Value) -> Result<Value, ControllerError> + Send + Sync + 'static,
    {
        self.handlers.insert(snap_id.to_string(), Arc::new(handler));
        self
    }

    #[must_use]
    pub fn is_running(&self, snap_id: &str) -> bool {
        self.running.read().contains(snap_id)
    }
}

#[async_trait]
impl ExecutionService for InProcessExecutionService {
    async fn execute(&self, snap_id: &str, method: &str, params: Value) -> Result<Value, ControllerError> {
        let handler = self
            .handlers
            .get(snap_id)
            .cloned()
            .ok_or_else(|| ControllerError::NotFound(format!("no executable for {snap_id}")))?;
        if self.running.write().insert(snap_id.to_string()) {
            debug!(snap_id, "Snap started");
        }
        handler(method, params)
    }

    async fn terminate(&self, snap_id: &str) {
        if self.running.write().remove(snap_id) {
            debug!(snap_id, "Snap terminated");
        }
    }
}
