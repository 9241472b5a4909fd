//! # Engine Host
//!
//! Owns at most one live [`Engine`]. `init` is idempotent and serialized:
//! concurrent callers all receive the same instance.
//!
//! ```rust,ignore
//! let host = EngineHost::new();
//! let engine = host.init(config, services, InitialState::default(), None).await?;
//! let snapshot = host.state()?;
//! host.destroy_engine().await;
//! ```

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use shared_types::RpcError;
use wallet_controllers::keyring::KeyringState;
use wallet_controllers::{AcceptResult, ControllerBus};

use crate::adapters::EngineServices;
use crate::container::{EngineConfig, EngineContext, InitialState};
use crate::engine::{AcceptApprovalOptions, Engine, RejectApprovalOptions};
use crate::errors::{EngineError, EngineResult};
use crate::state::EngineState;

static GLOBAL_HOST: Lazy<EngineHost> = Lazy::new(EngineHost::new);

/// The process-wide host.
#[must_use]
pub fn engine() -> &'static EngineHost {
    &GLOBAL_HOST
}

/// Slot for the live engine.
#[derive(Default)]
pub struct EngineHost {
    slot: RwLock<Option<Arc<Engine>>>,
    init_lock: Mutex<()>,
}

impl EngineHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live engine, building it first if there is none.
    pub async fn init(
        &self,
        config: EngineConfig,
        services: EngineServices,
        initial: InitialState,
        initial_keyring_state: Option<KeyringState>,
    ) -> EngineResult<Arc<Engine>> {
        if let Some(engine) = self.engine() {
            return Ok(engine);
        }
        let _guard = self.init_lock.lock().await;
        if let Some(engine) = self.engine() {
            debug!("Engine built by a concurrent init");
            return Ok(engine);
        }
        let engine = Engine::build(&config, &services, &initial, initial_keyring_state).await?;
        *self.slot.write() = Some(Arc::clone(&engine));
        Ok(engine)
    }

    /// The live engine, if any.
    #[must_use]
    pub fn engine(&self) -> Option<Arc<Engine>> {
        self.slot.read().clone()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.slot.read().is_some()
    }

    fn require(&self) -> EngineResult<Arc<Engine>> {
        self.engine().ok_or(EngineError::NotInitialized)
    }

    pub fn context(&self) -> EngineResult<EngineContext> {
        Ok(self.require()?.context().clone())
    }

    pub fn state(&self) -> EngineResult<EngineState> {
        Ok(self.require()?.state())
    }

    pub fn controller_messenger(&self) -> EngineResult<Arc<ControllerBus>> {
        Ok(Arc::clone(self.require()?.controller_messenger()))
    }

    pub fn get_total_fiat_account_balance(&self) -> EngineResult<f64> {
        self.require()?.get_total_fiat_account_balance()
    }

    pub fn has_funds(&self) -> EngineResult<bool> {
        Ok(self.require()?.has_funds())
    }

    pub fn reset_state(&self) -> EngineResult<()> {
        self.require()?.reset_state();
        Ok(())
    }

    pub async fn accept_pending_approval(
        &self,
        id: &str,
        value: Option<Value>,
        options: AcceptApprovalOptions,
    ) -> EngineResult<Option<AcceptResult>> {
        self.require()?.accept_pending_approval(id, value, options).await
    }

    pub fn reject_pending_approval(&self, id: &str, reason: RpcError, options: RejectApprovalOptions) -> EngineResult<()> {
        self.require()?.reject_pending_approval(id, reason, options);
        Ok(())
    }

    /// Tear the live engine down. A no-op when there is none.
    pub async fn destroy_engine(&self) {
        let _guard = self.init_lock.lock().await;
        let Some(engine) = self.slot.write().take() else {
            debug!("No engine to destroy");
            return;
        };
        engine.shutdown();
        info!("Engine slot cleared");
    }
}

impl std::fmt::Debug for EngineHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHost")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
