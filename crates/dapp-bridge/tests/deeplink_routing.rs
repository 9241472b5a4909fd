//! Deep link dispatch against the in-memory SDK.

use std::sync::Arc;
use std::time::Duration;

use dapp_bridge::adapters::{InMemorySdkConnect, SdkCall};
use dapp_bridge::deeplink::{ConnectRequest, ReconnectRequest};
use dapp_bridge::{BridgeConfig, BridgeError, DeeplinkAction, DeeplinkRequest, DeeplinkRouter};

fn link(channel: &str, origin: &str, url: &str) -> DeeplinkRequest {
    DeeplinkRequest {
        channel_id: channel.into(),
        origin: origin.into(),
        url: url.into(),
        other_public_key: "pubkey".into(),
        context: "deeplink-test".into(),
    }
}

fn ready_sdk() -> Arc<InMemorySdkConnect> {
    let sdk = Arc::new(InMemorySdkConnect::new());
    sdk.set_initialized(true);
    sdk
}

fn router(sdk: &Arc<InMemorySdkConnect>) -> DeeplinkRouter {
    DeeplinkRouter::new(sdk.clone(), &BridgeConfig::default())
}

#[tokio::test]
async fn test_unknown_channel_connects_fresh() {
    let sdk = ready_sdk();

    let action = router(&sdk)
        .handle(link("new-channel", "deeplink", "https://metamask.app.link/connect?channelId=new-channel"))
        .await
        .unwrap();

    assert_eq!(action, DeeplinkAction::Connect);
    assert_eq!(
        sdk.calls(),
        vec![SdkCall::Connect(ConnectRequest {
            id: "new-channel".into(),
            origin: "deeplink".into(),
            other_public_key: "pubkey".into(),
        })]
    );
}

#[tokio::test]
async fn test_known_channel_from_deeplink_revalidates_then_rotates_key() {
    // Arrange
    let sdk = ready_sdk();
    sdk.add_channel("known");

    // Act
    let action = router(&sdk)
        .handle(link("known", "deeplink", "https://metamask.app.link/connect?channelId=known"))
        .await
        .unwrap();

    // Assert
    assert_eq!(action, DeeplinkAction::Reconnect);
    assert_eq!(
        sdk.calls(),
        vec![
            SdkCall::Revalidate {
                channel_id: "known".into()
            },
            SdkCall::Reconnect(ReconnectRequest {
                channel_id: "known".into(),
                other_public_key: "pubkey".into(),
                context: "deeplink-test".into(),
                initial_connection: false,
                update_key: true,
            }),
        ]
    );
}

#[tokio::test]
async fn test_failed_revalidation_still_reconnects() {
    // Arrange
    let sdk = ready_sdk();
    sdk.add_channel("stale");
    sdk.set_fail_revalidation(true);

    // Act
    let action = router(&sdk)
        .handle(link("stale", "deeplink", "https://metamask.app.link/connect?channelId=stale"))
        .await
        .unwrap();

    // Assert
    assert_eq!(action, DeeplinkAction::Reconnect);
    let calls = sdk.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0],
        SdkCall::Revalidate {
            channel_id: "stale".into()
        }
    );
    assert!(matches!(&calls[1], SdkCall::Reconnect(r) if r.channel_id == "stale" && r.update_key));
}

#[tokio::test]
async fn test_qr_marker_skips_revalidation() {
    let sdk = ready_sdk();
    sdk.add_channel("known");

    router(&sdk)
        .handle(link("known", "deeplink", "https://metamask.app.link/connect?channelId=known&t=q"))
        .await
        .unwrap();

    let calls = sdk.calls();
    assert_eq!(calls.len(), 1);
    assert!(matches!(&calls[0], SdkCall::Reconnect(r) if r.update_key && !r.initial_connection));
}

#[tokio::test]
async fn test_qr_marker_reclassifies_new_connection_origin() {
    let sdk = ready_sdk();

    router(&sdk)
        .handle(link("fresh", "deeplink", "https://metamask.app.link/connect?channelId=fresh&t=q"))
        .await
        .unwrap();

    assert!(matches!(&sdk.calls()[0], SdkCall::Connect(c) if c.origin == "qr-code"));
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_sdk_initialization() {
    let sdk = Arc::new(InMemorySdkConnect::new());
    let later = sdk.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        later.set_initialized(true);
    });

    let action = router(&sdk)
        .handle(link("c1", "qr-code", "https://metamask.app.link/connect?channelId=c1"))
        .await
        .unwrap();

    assert_eq!(action, DeeplinkAction::Connect);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_bounded_wait() {
    let sdk = Arc::new(InMemorySdkConnect::new());

    let result = router(&sdk)
        .handle(link("c1", "deeplink", "https://metamask.app.link/connect?channelId=c1"))
        .await;

    assert!(matches!(result, Err(BridgeError::Timeout(_))));
    assert!(sdk.calls().is_empty());
}
