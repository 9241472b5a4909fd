//! # Bridge Flows
//!
//! Dapp session requests delivered by the in-memory protocol client, answered
//! by the live engine, with the user's decision taken from the approval queue.
//!
//! ```text
//! InMemorySignClient ──▶ WalletConnectManager ──▶ SessionAdapter
//!                                                    │
//!        ◀── approve/reject_request ◀── engine ◀─────┘
//!                                         ▲
//!                                 accept/reject approval
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};

    use dapp_bridge::adapters::{ClientCall, InMemorySignClient, InMemorySignClientFactory};
    use dapp_bridge::walletconnect::{PeerMetadata, Session, SessionRequest, SignClientEvent};
    use dapp_bridge::{BridgeConfig, BridgeServices, EngineAccess, WalletConnectHost};
    use shared_crypto::{personal_message_hash, recover_address, KdfParams, RecoverableSignature};
    use shared_types::{rpc, Address, ChainId, RpcError};
    use wallet_controllers::adapters::StaticPhishingListSource;
    use wallet_controllers::phishing::PhishingLists;
    use wallet_controllers::NetworkType;
    use wallet_engine::container::SettleDelay;
    use wallet_engine::{
        AcceptApprovalOptions, EngineConfig, EngineHost, EngineServices, InitialState, RejectApprovalOptions,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const TOPIC: &str = "uniswap-session";
    const DAPP_URL: &str = "https://app.uniswap.test";

    struct Wallet {
        engine: Arc<EngineHost>,
        client: Arc<InMemorySignClient>,
        host: WalletConnectHost,
        account: Address,
    }

    async fn wallet(blocklist: &[&str]) -> Wallet {
        let mut config = EngineConfig::default();
        config.polling.enabled = false;
        config.keyring.kdf = KdfParams::light();
        config.settle_delay = SettleDelay(Duration::from_millis(20));
        let mut services = EngineServices::local(&config);
        services.phishing_lists = Arc::new(StaticPhishingListSource::new(PhishingLists {
            blocklist: blocklist.iter().map(|host| host.to_string()).collect(),
            ..PhishingLists::default()
        }));

        let engine = Arc::new(EngineHost::new());
        engine
            .init(config, services, InitialState::default(), None)
            .await
            .unwrap();
        let context = engine.context().unwrap();
        context.phishing.maybe_update_state().await;
        let account = context.keyring.create_new_vault_and_keychain("pw").unwrap();

        let client = Arc::new(InMemorySignClient::new());
        client.add_session(Session {
            topic: TOPIC.into(),
            pairing_topic: String::new(),
            peer: PeerMetadata {
                name: "Uniswap".into(),
                description: String::new(),
                url: DAPP_URL.into(),
                icons: Vec::new(),
            },
            chain_id: ChainId::MAINNET,
            accounts: vec![account.clone()],
        });
        let mut bridge_services = BridgeServices::local();
        bridge_services.sign_client_factory = Arc::new(InMemorySignClientFactory::new(Arc::clone(&client)));

        let bridge_config = BridgeConfig {
            warmup_delay: Duration::ZERO,
            unlock_poll_interval: Duration::from_millis(10),
            unlock_timeout: Duration::from_millis(200),
            ..BridgeConfig::default()
        };
        let access: Arc<dyn EngineAccess> = engine.clone();
        let host = WalletConnectHost::new(bridge_config, access, bridge_services);
        host.init().await.unwrap();

        Wallet {
            engine,
            client,
            host,
            account,
        }
    }

    fn session_request(id: u64, chain: &str, origin: &str, method: &str, params: Value) -> SignClientEvent {
        SignClientEvent::SessionRequest(SessionRequest {
            id,
            topic: TOPIC.into(),
            chain_id: chain.into(),
            method: method.into(),
            params,
            verified_origin: origin.into(),
        })
    }

    async fn eventually(condition: impl Fn() -> bool) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    /// Wait for the peer to receive an answer to `id`.
    async fn answer(client: &Arc<InMemorySignClient>, id: u64) -> Result<Value, RpcError> {
        let find = {
            let client = Arc::clone(client);
            move || {
                client.calls().into_iter().find_map(|call| match call {
                    ClientCall::ApproveRequest { id: got, result, .. } if got == id => Some(Ok(result)),
                    ClientCall::RejectRequest { id: got, error, .. } if got == id => Some(Err(error)),
                    _ => None,
                })
            }
        };
        let probe = find.clone();
        eventually(move || probe().is_some()).await;
        find().unwrap()
    }

    async fn single_pending_approval(engine: &EngineHost) -> String {
        let approval = engine.context().unwrap().approval;
        let probe = Arc::clone(&approval);
        eventually(move || probe.pending_count() == 1).await;
        approval.state().pending_approvals.keys().next().cloned().unwrap()
    }

    // =============================================================================
    // SIGNING THROUGH A SESSION
    // =============================================================================

    #[tokio::test]
    async fn test_personal_sign_from_dapp_is_signed_after_user_accepts() {
        // Arrange
        let w = wallet(&[]).await;
        let params = json!(["0x68656c6c6f", w.account]);

        // Act
        w.client
            .emit(session_request(1, "eip155:1", DAPP_URL, "personal_sign", params));
        let id = single_pending_approval(&w.engine).await;
        w.engine
            .accept_pending_approval(&id, None, AcceptApprovalOptions::default())
            .await
            .unwrap();
        let result = answer(&w.client, 1).await.unwrap();

        // Assert
        let signature = RecoverableSignature::from_rpc_hex(result.as_str().unwrap()).unwrap();
        let signer = recover_address(&personal_message_hash(b"hello"), &signature).unwrap();
        assert_eq!(signer, w.account);
        assert!(!w.host.get_instance().unwrap().session(TOPIC).unwrap().is_pending(1));
    }

    #[tokio::test]
    async fn test_user_rejection_reaches_the_dapp() {
        let w = wallet(&[]).await;
        let params = json!(["0x68656c6c6f", w.account]);

        w.client
            .emit(session_request(2, "eip155:1", DAPP_URL, "personal_sign", params));
        let id = single_pending_approval(&w.engine).await;
        w.engine
            .reject_pending_approval(&id, RpcError::user_rejected_request(), RejectApprovalOptions::default())
            .unwrap();

        let error = answer(&w.client, 2).await.unwrap_err();
        assert_eq!(error.code, 4001);
    }

    // =============================================================================
    // READS AND REFUSALS
    // =============================================================================

    #[tokio::test]
    async fn test_accounts_are_the_selected_account() {
        let w = wallet(&[]).await;

        w.client
            .emit(session_request(3, "eip155:1", DAPP_URL, "eth_accounts", json!([])));

        assert_eq!(answer(&w.client, 3).await.unwrap(), json!([w.account]));
    }

    #[tokio::test]
    async fn test_phishing_listed_origin_is_refused() {
        // Arrange
        let w = wallet(&["evil.test"]).await;

        // Act
        w.client.emit(session_request(
            4,
            "eip155:1",
            "https://login.evil.test",
            "eth_accounts",
            json!([]),
        ));

        // Assert
        let error = answer(&w.client, 4).await.unwrap_err();
        assert_eq!(error.code, rpc::UNAUTHORIZED);
        assert_eq!(w.engine.context().unwrap().approval.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_chain_id_follows_network_switch() {
        let w = wallet(&[]).await;
        let context = w.engine.context().unwrap();

        context.network.set_provider_type(NetworkType::Sepolia).await.unwrap();
        w.client
            .emit(session_request(5, "eip155:1", DAPP_URL, "eth_chainId", json!([])));
        w.client
            .emit(session_request(6, "eip155:11155111", DAPP_URL, "eth_chainId", json!([])));

        let stale = answer(&w.client, 5).await.unwrap_err();
        assert_eq!(stale.code, 1);
        assert_eq!(answer(&w.client, 6).await.unwrap(), json!(ChainId::SEPOLIA.to_hex()));

        let client = Arc::clone(&w.client);
        eventually(move || {
            client.calls().iter().any(|call| {
                matches!(call, ClientCall::UpdateSession { chain_id, .. } if *chain_id == ChainId::SEPOLIA)
            })
        })
        .await;
    }
}
