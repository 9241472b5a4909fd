//! # Base Controller
//!
//! State container shared by every stateful controller.
//!
//! Each update replaces the state under a write lock, releases the lock, and
//! then publishes `<Name>:stateChange` with a clone of the new state. A
//! per-controller reentrant publish lock keeps state-change events in update
//! order even when a handler updates the same controller again.

use crate::messaging::{ControllerEvent, ControllerMessenger, ControllerName, StateSlice};
use parking_lot::{ReentrantMutex, RwLock};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{trace, warn};

/// A controller state slice.
pub trait ControllerState: Clone + Debug + Default + Send + Sync + 'static {
    /// Owning controller.
    const NAME: ControllerName;

    /// Wrap into the bus representation.
    fn into_slice(self) -> StateSlice;
}

/// State holder plus the controller's messenger.
pub struct BaseController<S: ControllerState> {
    state: RwLock<S>,
    messenger: Arc<ControllerMessenger>,
    publish_lock: ReentrantMutex<()>,
}

impl<S: ControllerState> BaseController<S> {
    pub fn new(messenger: Arc<ControllerMessenger>, initial: S) -> Self {
        Self {
            state: RwLock::new(initial),
            messenger,
            publish_lock: ReentrantMutex::new(()),
        }
    }

    /// Clone of the current state.
    #[must_use]
    pub fn state(&self) -> S {
        self.state.read().clone()
    }

    /// Read a projection of the state without cloning all of it.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.read())
    }

    /// Mutate the state and publish the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let _ordering = self.publish_lock.lock();
        let (result, snapshot) = {
            let mut state = self.state.write();
            let result = f(&mut state);
            (result, state.clone())
        };
        self.publish(snapshot);
        result
    }

    /// Replace the whole state.
    pub fn replace(&self, next: S) {
        self.update(|state| *state = next);
    }

    /// Restore the default state.
    pub fn reset(&self) {
        self.replace(S::default());
    }

    #[must_use]
    pub fn messenger(&self) -> &Arc<ControllerMessenger> {
        &self.messenger
    }

    fn publish(&self, snapshot: S) {
        let event = ControllerEvent::StateChange(Box::new(snapshot.into_slice()));
        match self.messenger.publish(event) {
            Ok(receivers) => trace!(controller = S::NAME.as_str(), receivers, "State published"),
            Err(e) => warn!(controller = S::NAME.as_str(), error = %e, "State change not published"),
        }
    }
}
