//! Engine host lifecycle and engine operations against the local chain.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use shared_crypto::KdfParams;
use shared_types::{Address, ApprovalType, ChainId, RpcError, U256};
use wallet_controllers::adapters::LocalProviderFactory;
use wallet_controllers::assets::tokens::Token;
use wallet_controllers::assets::{Nft, TokenBalancesState, TokenRatesState, TokensState};
use wallet_controllers::messaging::actions;
use wallet_controllers::{AddApprovalRequest, NetworkType};
use wallet_engine::adapters::{InMemoryVaultBackup, VaultBackupStore};
use wallet_engine::container::SettleDelay;
use wallet_engine::{
    AcceptApprovalOptions, EngineConfig, EngineError, EngineHost, EngineServices, InitialState,
    RejectApprovalOptions,
};

struct Harness {
    config: EngineConfig,
    services: EngineServices,
    chains: Arc<LocalProviderFactory>,
    backup: Arc<InMemoryVaultBackup>,
}

fn harness() -> Harness {
    let mut config = EngineConfig::default();
    config.polling.enabled = false;
    config.keyring.kdf = KdfParams::light();
    config.settle_delay = SettleDelay(Duration::from_millis(50));

    let chains = Arc::new(LocalProviderFactory::default());
    let backup = Arc::new(InMemoryVaultBackup::default());
    let mut services = EngineServices::local(&config);
    services.provider_factory = chains.clone();
    services.vault_backup = backup.clone();
    Harness {
        config,
        services,
        chains,
        backup,
    }
}

async fn init(host: &EngineHost, h: &Harness) -> Arc<wallet_engine::Engine> {
    host.init(h.config.clone(), h.services.clone(), InitialState::default(), None)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_accessors_fail_before_init() {
    let host = EngineHost::new();

    assert!(matches!(host.context(), Err(EngineError::NotInitialized)));
    assert!(matches!(host.state(), Err(EngineError::NotInitialized)));
    assert!(matches!(host.controller_messenger(), Err(EngineError::NotInitialized)));
    assert!(matches!(host.has_funds(), Err(EngineError::NotInitialized)));
    assert!(matches!(host.reset_state(), Err(EngineError::NotInitialized)));
    assert_eq!(
        host.get_total_fiat_account_balance().unwrap_err().to_string(),
        "Engine does not exist"
    );
}

#[tokio::test]
async fn test_accessors_defined_after_init() {
    let host = EngineHost::new();
    let h = harness();
    init(&host, &h).await;

    assert!(host.context().is_ok());
    let state = host.state().unwrap();
    assert_eq!(state.network.provider_config.chain_id, ChainId::MAINNET);
    assert!(state.currency_rate.conversion_rate.is_some());
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let host = EngineHost::new();
    let h = harness();

    let first = init(&host, &h).await;
    let second = init(&host, &h).await;

    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_concurrent_init_builds_one_engine() {
    let host = EngineHost::new();
    let h = harness();

    let (a, b) = tokio::join!(init(&host, &h), init(&host, &h));

    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn test_destroy_clears_slot_and_is_repeatable() {
    let host = EngineHost::new();
    let h = harness();
    let engine = init(&host, &h).await;
    let bus = engine.controller_messenger().clone();

    host.destroy_engine().await;
    host.destroy_engine().await;

    assert!(matches!(host.state(), Err(EngineError::NotInitialized)));
    assert_eq!(bus.handler_count(), 0);
    assert!(!bus.has_action_handler(actions::APPROVAL_ADD_REQUEST));
}

#[tokio::test]
async fn test_destroy_without_engine_is_noop() {
    let host = EngineHost::new();
    host.destroy_engine().await;
    assert!(!host.is_initialized());
}

#[tokio::test]
async fn test_reset_state_empties_assets_and_history() {
    // Arrange
    let host = EngineHost::new();
    let h = harness();
    let engine = init(&host, &h).await;
    let context = engine.context();
    let token = Address::from_bytes([0x11; 20]);

    let mut tokens = TokensState::default();
    tokens.tokens.push(Token::new(token.clone(), "DAI", 18));
    tokens.ignored_tokens.push(Address::from_bytes([0x12; 20]));
    context.tokens.update(tokens);
    let mut balances = TokenBalancesState::default();
    balances.contract_balances.insert(token.clone(), "0x10".into());
    context.token_balances.update(balances);
    let mut rates = TokenRatesState::default();
    rates.contract_exchange_rates.insert(token, 0.5);
    context.token_rates.update(rates);

    // Act
    host.reset_state().unwrap();

    // Assert
    let state = host.state().unwrap();
    assert!(state.tokens.tokens.is_empty());
    assert!(state.tokens.ignored_tokens.is_empty());
    assert!(state.nft.all_nfts.is_empty());
    assert!(state.token_balances.contract_balances.is_empty());
    assert!(state.token_rates.contract_exchange_rates.is_empty());
    assert!(state.transaction.transactions.is_empty());
}

#[tokio::test]
async fn test_native_balance_alone_counts_as_funds() {
    // Arrange
    let host = EngineHost::new();
    let h = harness();
    let engine = init(&host, &h).await;
    let context = engine.context();
    let account = context.keyring.create_new_vault_and_keychain("correct horse").unwrap();
    // 0.05 ETH at the local 2000 usd rate
    h.chains
        .chain(ChainId::MAINNET)
        .set_balance(&account, U256::from(50_000_000_000_000_000u64));
    context.account_tracker.refresh().await.unwrap();

    let token = Address::from_bytes([0x22; 20]);
    let mut tokens = TokensState::default();
    tokens.tokens.push(Token::new(token.clone(), "ZRO", 18));
    context.tokens.update(tokens);
    let mut balances = TokenBalancesState::default();
    balances.contract_balances.insert(token, "0x0".into());
    context.token_balances.update(balances);

    // Act
    let total = host.get_total_fiat_account_balance().unwrap();
    let funded = host.has_funds().unwrap();

    // Assert
    assert_eq!(total, 100.0);
    assert!(funded);
}

#[tokio::test]
async fn test_collectible_alone_counts_as_funds() {
    // Arrange
    let host = EngineHost::new();
    let h = harness();
    let engine = init(&host, &h).await;
    let context = engine.context();
    context.keyring.create_new_vault_and_keychain("pw").unwrap();
    context
        .nft
        .add_nft(Nft::erc721(Address::from_bytes([0x33; 20]), "7"))
        .unwrap();

    // Act
    let total = host.get_total_fiat_account_balance().unwrap();
    let funded = host.has_funds().unwrap();

    // Assert
    assert_eq!(total, 0.0);
    assert!(context.tokens.state().tokens.is_empty());
    assert!(funded);
}

#[tokio::test]
async fn test_empty_wallet_has_no_funds() {
    let host = EngineHost::new();
    let h = harness();
    let engine = init(&host, &h).await;
    engine.context().keyring.create_new_vault_and_keychain("pw").unwrap();

    assert!(!host.has_funds().unwrap());
}

#[tokio::test]
async fn test_second_accept_is_an_error() {
    let host = EngineHost::new();
    let h = harness();
    let engine = init(&host, &h).await;
    let pending = engine
        .context()
        .approval
        .add_request(AddApprovalRequest::new("https://dapp.test", ApprovalType::Transaction, json!({})))
        .unwrap();
    let strict = AcceptApprovalOptions {
        handle_errors: false,
        ..AcceptApprovalOptions::default()
    };

    let first = host.accept_pending_approval(&pending.id, None, strict).await;
    let second = host.accept_pending_approval(&pending.id, None, strict).await;

    assert!(matches!(first, Ok(Some(_))));
    assert!(matches!(second, Err(EngineError::Approval(_))));
}

#[tokio::test]
async fn test_accept_errors_swallowed_by_default() {
    let host = EngineHost::new();
    let h = harness();
    init(&host, &h).await;

    let result = host
        .accept_pending_approval("missing", None, AcceptApprovalOptions::default())
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_reject_resolves_requester_once() {
    let host = EngineHost::new();
    let h = harness();
    let engine = init(&host, &h).await;
    let pending = engine
        .context()
        .approval
        .add_request(AddApprovalRequest::new("https://dapp.test", ApprovalType::PersonalSign, json!({})))
        .unwrap();
    let id = pending.id.clone();

    host.reject_pending_approval(&id, RpcError::user_rejected_request(), RejectApprovalOptions::default())
        .unwrap();
    host.reject_pending_approval(&id, RpcError::user_rejected_request(), RejectApprovalOptions::default())
        .unwrap();

    assert!(pending.wait().await.is_err());
    assert!(!engine.context().approval.has(&id));
}

#[tokio::test]
async fn test_security_alerts_without_key_abort_construction() {
    let host = EngineHost::new();
    let mut h = harness();
    h.config.security.alerts_enabled = true;

    let result = host
        .init(h.config.clone(), h.services.clone(), InitialState::default(), None)
        .await;

    assert!(matches!(result, Err(EngineError::SecurityController(_))));
    assert!(!host.is_initialized());
}

#[tokio::test]
async fn test_security_alerts_enabled_builds_controller() {
    let host = EngineHost::new();
    let mut h = harness();
    h.config.security.alerts_enabled = true;
    h.config.security.public_key = Some("pk".into());
    h.config.security.cdn_base_url = Some("https://cdn.test".into());

    let engine = init(&host, &h).await;

    assert!(engine.context().security.is_some());
}

#[tokio::test]
async fn test_vault_is_backed_up_on_creation() {
    let host = EngineHost::new();
    let h = harness();
    let engine = init(&host, &h).await;

    engine.context().keyring.create_new_vault_and_keychain("pw").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stored = h.backup.load().await.unwrap();
    assert_eq!(stored, engine.context().keyring.state().vault);
    assert!(stored.is_some());
}

#[tokio::test]
async fn test_network_switch_reconfigures_dependents() {
    let host = EngineHost::new();
    let h = harness();
    let engine = init(&host, &h).await;
    let context = engine.context();

    context.network.set_provider_type(NetworkType::Sepolia).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(context.assets_contract.chain_id(), ChainId::SEPOLIA);
    assert_eq!(context.swaps.chain_id(), ChainId::SEPOLIA);
}

#[tokio::test]
async fn test_initial_state_is_applied() {
    let host = EngineHost::new();
    let h = harness();
    let initial: InitialState = serde_json::from_value(json!({
        "TokenRatesController": { "contractExchangeRates": {} },
        "PreferencesController": null
    }))
    .unwrap();

    host.init(h.config.clone(), h.services.clone(), initial, None).await.unwrap();

    assert!(host.state().unwrap().token_rates.contract_exchange_rates.is_empty());
}
