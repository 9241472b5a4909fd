//! How the bridge reaches the wallet engine.

use std::sync::Arc;

use wallet_controllers::ControllerBus;
use wallet_engine::{EngineContext, EngineHost, EngineResult};

/// Read access to a live engine.
pub trait EngineAccess: Send + Sync {
    fn context(&self) -> EngineResult<EngineContext>;

    fn controller_messenger(&self) -> EngineResult<Arc<ControllerBus>>;
}

impl EngineAccess for EngineHost {
    fn context(&self) -> EngineResult<EngineContext> {
        EngineHost::context(self)
    }

    fn controller_messenger(&self) -> EngineResult<Arc<ControllerBus>> {
        EngineHost::controller_messenger(self)
    }
}

/// The process-wide engine host.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalEngine;

impl EngineAccess for GlobalEngine {
    fn context(&self) -> EngineResult<EngineContext> {
        wallet_engine::engine().context()
    }

    fn controller_messenger(&self) -> EngineResult<Arc<ControllerBus>> {
        wallet_engine::engine().controller_messenger()
    }
}
