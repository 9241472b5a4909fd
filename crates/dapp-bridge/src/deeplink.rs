//! # Deep Link Router
//!
//! Dispatches an SDK deep link to either a reconnect of a known channel or
//! a brand-new channel connection.
//!
//! | Channel | Origin | Action |
//! |---------|--------|--------|
//! | known | `deeplink` | revalidate, then reconnect with key rotation |
//! | known | other | reconnect with key rotation |
//! | unknown | any | connect to channel |
//!
//! A `deeplink` origin whose url carries the QR marker is treated as
//! `qr-code`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use crate::config::BridgeConfig;
use crate::constants::{ORIGIN_DEEPLINK, ORIGIN_QR_CODE, QRCODE_PARAM_PATTERN};
use crate::errors::{BridgeResult, ProtocolError};
use crate::wait::wait_for_condition;

/// An inbound SDK link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeeplinkRequest {
    pub channel_id: String,
    pub origin: String,
    pub url: String,
    pub other_public_key: String,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectRequest {
    pub channel_id: String,
    pub other_public_key: String,
    pub context: String,
    pub initial_connection: bool,
    /// Rotate the channel key.
    pub update_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub id: String,
    pub origin: String,
    pub other_public_key: String,
}

/// The SDK connection manager.
#[async_trait]
pub trait SdkConnect: Send + Sync {
    fn has_initialized(&self) -> bool;

    /// Ids of the channels the wallet already knows.
    fn connections(&self) -> Vec<String>;

    /// Re-approve the channel's host without asking the user.
    async fn revalidate_channel(&self, channel_id: &str) -> Result<(), ProtocolError>;

    async fn reconnect(&self, request: ReconnectRequest) -> Result<(), ProtocolError>;

    async fn connect_to_channel(&self, request: ConnectRequest) -> Result<(), ProtocolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeeplinkAction {
    Reconnect,
    Connect,
}

impl DeeplinkAction {
    fn as_label(self) -> &'static str {
        match self {
            Self::Reconnect => "reconnect",
            Self::Connect => "connect",
        }
    }
}

/// Origin after correcting for QR intent embedded in a universal link.
#[must_use]
pub fn classify_origin(origin: &str, url: &str) -> String {
    if origin == ORIGIN_DEEPLINK && url.contains(QRCODE_PARAM_PATTERN) {
        ORIGIN_QR_CODE.to_string()
    } else {
        origin.to_string()
    }
}

pub struct DeeplinkRouter {
    sdk: Arc<dyn SdkConnect>,
    poll_interval: Duration,
    timeout: Duration,
}

impl DeeplinkRouter {
    #[must_use]
    pub fn new(sdk: Arc<dyn SdkConnect>, config: &BridgeConfig) -> Self {
        Self {
            sdk,
            poll_interval: config.deeplink_poll_interval,
            timeout: config.deeplink_timeout,
        }
    }

    /// Route one link, waiting for the SDK to finish initializing first.
    #[instrument(name = "deeplink", skip(self, request), fields(channel = %request.channel_id, origin = %request.origin))]
    pub async fn handle(&self, request: DeeplinkRequest) -> BridgeResult<DeeplinkAction> {
        if !self.sdk.has_initialized() {
            let sdk = Arc::clone(&self.sdk);
            let ready = wait_for_condition(move || sdk.has_initialized(), self.poll_interval, self.timeout, "SDK initialization").await;
            if let Err(e) = ready {
                error!(error = %e, "Deep link dropped after waiting for the SDK");
                wallet_telemetry::metric_inc!(wallet_telemetry::DEEPLINKS_HANDLED, &["timeout"]);
                return Err(e);
            }
        }

        let origin = classify_origin(&request.origin, &request.url);
        let known = self.sdk.connections().contains(&request.channel_id);
        let routed = if known {
            self.reconnect(&request, &origin).await
        } else {
            self.sdk
                .connect_to_channel(ConnectRequest {
                    id: request.channel_id.clone(),
                    origin: origin.clone(),
                    other_public_key: request.other_public_key.clone(),
                })
                .await
                .map(|()| DeeplinkAction::Connect)
        };

        match routed {
            Ok(action) => {
                info!(action = action.as_label(), %origin, "Deep link routed");
                wallet_telemetry::metric_inc!(wallet_telemetry::DEEPLINKS_HANDLED, &[action.as_label()]);
                Ok(action)
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to channel");
                Err(e.into())
            }
        }
    }

    async fn reconnect(&self, request: &DeeplinkRequest, origin: &str) -> Result<DeeplinkAction, ProtocolError> {
        if origin == ORIGIN_DEEPLINK {
            // A stale channel still gets the reconnect; rotating the key is what recovers it.
            if let Err(e) = self.sdk.revalidate_channel(&request.channel_id).await {
                warn!(error = %e, channel = %request.channel_id, "Channel revalidation failed");
            }
        }
        self.sdk
            .reconnect(ReconnectRequest {
                channel_id: request.channel_id.clone(),
                other_public_key: request.other_public_key.clone(),
                context: request.context.clone(),
                initial_connection: false,
                update_key: true,
            })
            .await?;
        Ok(DeeplinkAction::Reconnect)
    }
}

impl std::fmt::Debug for DeeplinkRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeeplinkRouter")
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_marker_reclassifies_deeplink() {
        assert_eq!(classify_origin("deeplink", "https://metamask.app.link/connect?channelId=1&t=q"), "qr-code");
        assert_eq!(classify_origin("deeplink", "https://metamask.app.link/connect?channelId=1"), "deeplink");
    }

    #[test]
    fn test_qr_marker_ignored_for_other_origins() {
        assert_eq!(classify_origin("in-app", "https://x.test/?a=1&t=q"), "in-app");
    }
}
