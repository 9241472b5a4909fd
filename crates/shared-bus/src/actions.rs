//! # Bus Actions
//!
//! Actions are request/response calls routed by name to the single handler
//! the owning controller registered.

use crate::error::BusError;
use async_trait::async_trait;

/// An action that can be routed through the bus.
pub trait BusAction: Send + 'static {
    /// Response produced by the handler.
    type Output: Send + 'static;

    /// Error produced by the handler; bus failures convert into it.
    type Error: From<BusError> + Send + 'static;

    /// Fully-qualified type, e.g. `ApprovalController:addRequest`.
    fn action_type(&self) -> &'static str;
}

/// Handler registered for one action type.
#[async_trait]
pub trait ActionHandler<A: BusAction>: Send + Sync {
    async fn handle(&self, action: A) -> Result<A::Output, A::Error>;
}
