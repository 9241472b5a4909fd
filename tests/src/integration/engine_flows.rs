//! # Engine Flows
//!
//! Controllers wired by the engine, exercised through the shared bus the
//! way a UI or the dapp bridge drives them.
//!
//! ## Flows Tested:
//!
//! 1. **Network settling**: a burst of switches reconfigures dependents once
//! 2. **Approval rate limiting**: one pending request per origin and type
//! 3. **Keyring vault**: wrong password keeps the wallet locked
//! 4. **Restricted messengers**: allow-list misconfiguration fails up front
//! 5. **Signing**: personal_sign resolves through the approval queue

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use shared_bus::{BusError, RestrictedConfig};
    use shared_crypto::{personal_message_hash, recover_address, KdfParams, RecoverableSignature};
    use shared_types::{ApprovalType, ChainId, RpcError};
    use wallet_controllers::messaging::{actions, events};
    use wallet_controllers::transaction::TransactionHubEvent;
    use wallet_controllers::{AddApprovalRequest, ApprovalError, ControllerError, KeyringError, NetworkType};
    use wallet_engine::container::SettleDelay;
    use wallet_engine::{
        AcceptApprovalOptions, EngineConfig, EngineHost, EngineServices, InitialState, RejectApprovalOptions,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const DAPP: &str = "https://dapp.test";

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.polling.enabled = false;
        config.keyring.kdf = KdfParams::light();
        config.settle_delay = SettleDelay(Duration::from_millis(50));
        config
    }

    async fn live_engine() -> EngineHost {
        let config = config();
        let services = EngineServices::local(&config);
        let host = EngineHost::new();
        host.init(config, services, InitialState::default(), None)
            .await
            .unwrap();
        host
    }

    async fn eventually(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    // =============================================================================
    // NETWORK SETTLING
    // =============================================================================

    #[tokio::test]
    async fn test_network_burst_settles_on_last_chain() {
        // Arrange
        let host = live_engine().await;
        let context = host.context().unwrap();
        let mut hub = context.transaction.subscribe_hub();

        // Act
        context.network.set_provider_type(NetworkType::Goerli).await.unwrap();
        context.network.set_provider_type(NetworkType::Sepolia).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        // Assert
        let mut changes = Vec::new();
        while let Ok(event) = hub.try_recv() {
            if let TransactionHubEvent::NetworkChange(chain) = event {
                changes.push(chain);
            }
        }
        assert_eq!(changes, vec![ChainId::SEPOLIA]);
        assert_eq!(context.assets_contract.chain_id(), ChainId::SEPOLIA);
    }

    #[tokio::test]
    async fn test_switching_back_within_window_skips_reconfiguration() {
        let host = live_engine().await;
        let context = host.context().unwrap();
        let mut hub = context.transaction.subscribe_hub();

        context.network.set_provider_type(NetworkType::Sepolia).await.unwrap();
        context.network.set_provider_type(NetworkType::Mainnet).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let mut changes = 0;
        while let Ok(event) = hub.try_recv() {
            if matches!(event, TransactionHubEvent::NetworkChange(_)) {
                changes += 1;
            }
        }
        assert_eq!(changes, 0);
        assert_eq!(context.network.current_chain_id(), ChainId::MAINNET);
    }

    // =============================================================================
    // APPROVALS
    // =============================================================================

    #[tokio::test]
    async fn test_second_connection_request_from_origin_is_refused() {
        let host = live_engine().await;
        let approval = host.context().unwrap().approval;

        let first = approval.add_request(AddApprovalRequest::new(DAPP, ApprovalType::WalletConnect, json!({})));
        let second = approval.add_request(AddApprovalRequest::new(DAPP, ApprovalType::WalletConnect, json!({})));
        let elsewhere =
            approval.add_request(AddApprovalRequest::new("https://other.test", ApprovalType::WalletConnect, json!({})));

        assert!(first.is_ok());
        assert!(matches!(second, Err(ApprovalError::AlreadyPending { .. })));
        assert!(elsewhere.is_ok());
        assert_eq!(approval.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_signature_requests_are_not_rate_limited() {
        let host = live_engine().await;
        let approval = host.context().unwrap().approval;

        for _ in 0..3 {
            approval
                .add_request(AddApprovalRequest::new(DAPP, ApprovalType::PersonalSign, json!({})))
                .unwrap();
        }

        assert_eq!(approval.pending_count(), 3);
    }

    #[tokio::test]
    async fn test_rejected_approval_frees_the_slot() {
        let host = live_engine().await;
        let approval = host.context().unwrap().approval;
        let pending = approval
            .add_request(AddApprovalRequest::new(DAPP, ApprovalType::WalletConnect, json!({})))
            .unwrap();

        host.reject_pending_approval(&pending.id, RpcError::user_rejected_request(), RejectApprovalOptions::default())
            .unwrap();

        assert!(approval
            .add_request(AddApprovalRequest::new(DAPP, ApprovalType::WalletConnect, json!({})))
            .is_ok());
    }

    // =============================================================================
    // KEYRING
    // =============================================================================

    #[tokio::test]
    async fn test_wrong_password_keeps_wallet_locked() {
        // Arrange
        let host = live_engine().await;
        let keyring = host.context().unwrap().keyring;
        let account = keyring.create_new_vault_and_keychain("correct horse").unwrap();
        keyring.set_locked();

        // Act
        let wrong = keyring.submit_password("battery staple");

        // Assert
        assert!(matches!(wrong, Err(ControllerError::Keyring(KeyringError::IncorrectPassword))));
        assert!(!keyring.is_unlocked());

        keyring.submit_password("correct horse").unwrap();
        assert!(keyring.is_unlocked());
        assert_eq!(keyring.accounts(), vec![account]);
    }

    // =============================================================================
    // RESTRICTED MESSENGERS
    // =============================================================================

    #[tokio::test]
    async fn test_restricted_messenger_validates_allow_lists() {
        let host = live_engine().await;
        let bus = host.controller_messenger().unwrap();

        let valid = bus.restricted(
            RestrictedConfig::new("BridgeClient")
                .allow_actions(&[actions::APPROVAL_ADD_REQUEST])
                .allow_events(&[events::NETWORK_DID_CHANGE]),
        );
        let unknown_action =
            bus.restricted(RestrictedConfig::new("BridgeClient").allow_actions(&["NopeController:missing"]));
        let unknown_event =
            bus.restricted(RestrictedConfig::new("BridgeClient").allow_events(&["NetworkController:neverFired"]));
        let bad_name = bus.restricted(RestrictedConfig::new("Bridge:Client"));

        assert!(valid.is_ok());
        assert!(matches!(unknown_action, Err(BusError::UnknownAction(_))));
        assert!(matches!(unknown_event, Err(BusError::UnknownEvent(_))));
        assert!(matches!(bad_name, Err(BusError::MalformedName(_))));
    }

    // =============================================================================
    // SIGNING
    // =============================================================================

    #[tokio::test]
    async fn test_personal_sign_resolves_after_approval() {
        // Arrange
        let host = live_engine().await;
        let context = host.context().unwrap();
        let account = context.keyring.create_new_vault_and_keychain("pw").unwrap();
        let signature = Arc::clone(&context.signature);
        let from = account.clone();
        let request = tokio::spawn(async move {
            signature
                .new_unsigned_personal_message(from, "hello".into(), DAPP)
                .await
        });

        // Act
        let approval = Arc::clone(&context.approval);
        eventually(move || approval.pending_count() == 1).await;
        let id = context
            .approval
            .state()
            .pending_approvals
            .keys()
            .next()
            .cloned()
            .unwrap();
        host.accept_pending_approval(&id, None, AcceptApprovalOptions::default())
            .await
            .unwrap();
        let signed = request.await.unwrap().unwrap();

        // Assert
        let parsed = RecoverableSignature::from_rpc_hex(&signed).unwrap();
        let signer = recover_address(&personal_message_hash(b"hello"), &parsed).unwrap();
        assert_eq!(signer, account);
        assert_eq!(context.approval.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_personal_sign_reports_user_rejection() {
        let host = live_engine().await;
        let context = host.context().unwrap();
        let account = context.keyring.create_new_vault_and_keychain("pw").unwrap();
        let signature = Arc::clone(&context.signature);
        let request = tokio::spawn(async move {
            signature
                .new_unsigned_personal_message(account, "hello".into(), DAPP)
                .await
        });

        let approval = Arc::clone(&context.approval);
        eventually(move || approval.pending_count() == 1).await;
        let id = context
            .approval
            .state()
            .pending_approvals
            .keys()
            .next()
            .cloned()
            .unwrap();
        host.reject_pending_approval(&id, RpcError::user_rejected_request(), RejectApprovalOptions::default())
            .unwrap();

        let error = request.await.unwrap().unwrap_err();
        assert_eq!(error.to_rpc_error().code, 4001);
    }
}
