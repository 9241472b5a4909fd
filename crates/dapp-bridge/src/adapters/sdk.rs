//! In-process SDK connection manager.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::deeplink::{ConnectRequest, ReconnectRequest, SdkConnect};
use crate::errors::ProtocolError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkCall {
    Revalidate { channel_id: String },
    Reconnect(ReconnectRequest),
    Connect(ConnectRequest),
}

/// Tracks channels in memory and records every call.
#[derive(Debug, Default)]
pub struct InMemorySdkConnect {
    initialized: AtomicBool,
    fail_revalidation: AtomicBool,
    channels: Mutex<Vec<String>>,
    calls: Mutex<Vec<SdkCall>>,
}

impl InMemorySdkConnect {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    /// Make `revalidate_channel` report a transport failure.
    pub fn set_fail_revalidation(&self, fail: bool) {
        self.fail_revalidation.store(fail, Ordering::SeqCst);
    }

    pub fn add_channel(&self, channel_id: impl Into<String>) {
        self.channels.lock().push(channel_id.into());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<SdkCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SdkConnect for InMemorySdkConnect {
    fn has_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn connections(&self) -> Vec<String> {
        self.channels.lock().clone()
    }

    async fn revalidate_channel(&self, channel_id: &str) -> Result<(), ProtocolError> {
        self.calls.lock().push(SdkCall::Revalidate {
            channel_id: channel_id.to_string(),
        });
        if self.fail_revalidation.load(Ordering::SeqCst) {
            return Err(ProtocolError::Transport(format!("channel {channel_id} is unreachable")));
        }
        Ok(())
    }

    async fn reconnect(&self, request: ReconnectRequest) -> Result<(), ProtocolError> {
        self.calls.lock().push(SdkCall::Reconnect(request));
        Ok(())
    }

    async fn connect_to_channel(&self, request: ConnectRequest) -> Result<(), ProtocolError> {
        self.add_channel(request.id.clone());
        self.calls.lock().push(SdkCall::Connect(request));
        Ok(())
    }
}
