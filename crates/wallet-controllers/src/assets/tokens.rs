//! # Tokens Controller
//!
//! ERC-20 tokens the user holds, per chain and account. `tokens`,
//! `ignored_tokens` and `detected_tokens` always mirror the entries of the
//! current chain and selected account.

use crate::approval::AddApprovalRequest;
use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{ControllerAction, ControllerMessenger, ControllerName, StateSlice};
use crate::ports::{ChainIdSource, SelectedAddressSource};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_types::{Address, ApprovalType, ChainId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A tracked ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub aggregators: Vec<String>,
    #[serde(default)]
    pub is_erc721: bool,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            image: None,
            name: None,
            aggregators: Vec::new(),
            is_erc721: false,
        }
    }
}

type PerAccount<T> = BTreeMap<ChainId, BTreeMap<Address, Vec<T>>>;

/// Tokens state slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensState {
    pub tokens: Vec<Token>,
    pub ignored_tokens: Vec<Address>,
    pub detected_tokens: Vec<Token>,
    pub all_tokens: PerAccount<Token>,
    pub all_ignored_tokens: PerAccount<Address>,
    pub all_detected_tokens: PerAccount<Token>,
}

impl ControllerState for TokensState {
    const NAME: ControllerName = ControllerName::Tokens;

    fn into_slice(self) -> StateSlice {
        StateSlice::Tokens(self)
    }
}

impl TokensState {
    fn refresh_views(&mut self, chain: ChainId, account: Option<&Address>) {
        let pick = |all: &PerAccount<Token>| {
            account
                .and_then(|a| all.get(&chain).and_then(|m| m.get(a)).cloned())
                .unwrap_or_default()
        };
        self.tokens = pick(&self.all_tokens);
        self.detected_tokens = pick(&self.all_detected_tokens);
        self.ignored_tokens = account
            .and_then(|a| self.all_ignored_tokens.get(&chain).and_then(|m| m.get(a)).cloned())
            .unwrap_or_default();
    }
}

fn slot<'a, T>(all: &'a mut PerAccount<T>, chain: ChainId, account: &Address) -> &'a mut Vec<T> {
    all.entry(chain).or_default().entry(account.clone()).or_default()
}

pub struct TokensController {
    base: BaseController<TokensState>,
    chain_id: ChainIdSource,
    selected_address: SelectedAddressSource,
}

impl TokensController {
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        chain_id: ChainIdSource,
        selected_address: SelectedAddressSource,
        initial: TokensState,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseController::new(messenger, initial),
            chain_id,
            selected_address,
        })
    }

    #[must_use]
    pub fn state(&self) -> TokensState {
        self.base.state()
    }

    /// Tokens of the current chain and account.
    #[must_use]
    pub fn tokens(&self) -> Vec<Token> {
        self.base.read(|s| s.tokens.clone())
    }

    fn current(&self) -> ControllerResult<(ChainId, Address)> {
        let account = (self.selected_address)()
            .ok_or_else(|| ControllerError::InvalidParams("no account selected".into()))?;
        Ok(((self.chain_id)(), account))
    }

    /// Track a token for the current chain and account.
    pub fn add_token(&self, token: Token) -> ControllerResult<()> {
        let (chain, account) = self.current()?;
        debug!(token = %token.address, chain = %chain, "Token added");
        self.base.update(|state| {
            let tokens = slot(&mut state.all_tokens, chain, &account);
            tokens.retain(|t| t.address != token.address);
            tokens.push(token.clone());
            slot(&mut state.all_ignored_tokens, chain, &account).retain(|a| a != &token.address);
            slot(&mut state.all_detected_tokens, chain, &account).retain(|t| t.address != token.address);
            state.refresh_views(chain, Some(&account));
        });
        Ok(())
    }

    /// Record tokens found by detection. Ignored and tracked tokens are skipped.
    pub fn add_detected_tokens(&self, detected: Vec<Token>) -> ControllerResult<()> {
        let (chain, account) = self.current()?;
        self.base.update(|state| {
            let ignored = slot(&mut state.all_ignored_tokens, chain, &account).clone();
            let tracked: Vec<Address> = slot(&mut state.all_tokens, chain, &account)
                .iter()
                .map(|t| t.address.clone())
                .collect();
            let list = slot(&mut state.all_detected_tokens, chain, &account);
            for token in detected {
                if ignored.contains(&token.address)
                    || tracked.contains(&token.address)
                    || list.iter().any(|t| t.address == token.address)
                {
                    continue;
                }
                list.push(token);
            }
            state.refresh_views(chain, Some(&account));
        });
        Ok(())
    }

    /// Hide tokens and stop tracking them.
    pub fn ignore_tokens(&self, addresses: &[Address]) -> ControllerResult<()> {
        let (chain, account) = self.current()?;
        self.base.update(|state| {
            slot(&mut state.all_tokens, chain, &account).retain(|t| !addresses.contains(&t.address));
            slot(&mut state.all_detected_tokens, chain, &account)
                .retain(|t| !addresses.contains(&t.address));
            let ignored = slot(&mut state.all_ignored_tokens, chain, &account);
            for address in addresses {
                if !ignored.contains(address) {
                    ignored.push(address.clone());
                }
            }
            state.refresh_views(chain, Some(&account));
        });
        Ok(())
    }

    /// `wallet_watchAsset`: ask the user, then track the token.
    pub async fn watch_asset(&self, token: Token, origin: &str) -> ControllerResult<()> {
        if token.symbol.is_empty() || token.symbol.len() > 11 {
            return Err(ControllerError::InvalidParams(format!(
                "Invalid symbol '{}': must be 1 to 11 characters",
                token.symbol
            )));
        }
        if token.decimals > 36 {
            return Err(ControllerError::InvalidParams(format!(
                "Invalid decimals '{}': must be 0 <= 36",
                token.decimals
            )));
        }

        let request = AddApprovalRequest::new(
            origin,
            ApprovalType::WatchAsset,
            json!({ "asset": token, "origin": origin }),
        );
        self.base
            .messenger()
            .call(ControllerAction::AddApprovalRequest(request))
            .await?
            .into_approval()?;

        info!(token = %token.address, origin, "Watched asset accepted");
        self.add_token(token)
    }

    /// Re-derive the current views after a network or account switch.
    pub fn on_network_or_account_change(&self) {
        let chain = (self.chain_id)();
        let account = (self.selected_address)();
        self.base
            .update(|state| state.refresh_views(chain, account.as_ref()));
    }

    /// Clear every token, ignored and detected list.
    pub fn clear(&self) {
        self.base.reset();
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: TokensState) {
        self.base.replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{AcceptOptions, ApprovalConfig, ApprovalController};
    use crate::messaging::actions;
    use crate::test_support::{messenger_for, messenger_on};
    use parking_lot::RwLock;

    fn account() -> Address {
        Address::from_bytes([0x01; 20])
    }

    fn token(n: u8) -> Token {
        Token::new(Address::from_bytes([n; 20]), format!("T{n}"), 18)
    }

    fn controller() -> (Arc<crate::messaging::ControllerBus>, Arc<TokensController>, Arc<RwLock<ChainId>>) {
        let (bus, messenger) = messenger_for(ControllerName::Tokens, &[], &[]);
        let chain = Arc::new(RwLock::new(ChainId::MAINNET));
        let reader = chain.clone();
        let tokens = TokensController::new(
            messenger,
            Arc::new(move || *reader.read()),
            Arc::new(|| Some(account())),
            TokensState::default(),
        );
        (bus, tokens, chain)
    }

    #[test]
    fn test_tokens_are_scoped_to_chain() {
        let (_bus, tokens, chain) = controller();
        tokens.add_token(token(0xaa)).unwrap();
        assert_eq!(tokens.tokens().len(), 1);

        *chain.write() = ChainId::POLYGON;
        tokens.on_network_or_account_change();
        assert!(tokens.tokens().is_empty());

        *chain.write() = ChainId::MAINNET;
        tokens.on_network_or_account_change();
        assert_eq!(tokens.tokens().len(), 1);
    }

    #[test]
    fn test_ignored_tokens_are_not_detected_again() {
        let (_bus, tokens, _) = controller();
        tokens.ignore_tokens(&[token(0xbb).address]).unwrap();
        tokens.add_detected_tokens(vec![token(0xbb), token(0xcc)]).unwrap();

        let state = tokens.state();
        assert_eq!(state.detected_tokens, vec![token(0xcc)]);
        assert_eq!(state.ignored_tokens, vec![token(0xbb).address]);
    }

    #[test]
    fn test_clear_empties_everything() {
        let (_bus, tokens, _) = controller();
        tokens.add_token(token(0xaa)).unwrap();
        tokens.ignore_tokens(&[token(0xbb).address]).unwrap();

        tokens.clear();

        assert_eq!(tokens.state(), TokensState::default());
    }

    #[tokio::test]
    async fn test_watch_asset_goes_through_approval() {
        // Arrange
        let (bus, approval_messenger) = messenger_for(ControllerName::Approval, &[], &[]);
        let approvals = ApprovalController::new(approval_messenger, ApprovalConfig::default()).unwrap();
        let messenger = messenger_on(&bus, ControllerName::Tokens, &[actions::APPROVAL_ADD_REQUEST], &[]);
        let tokens = TokensController::new(
            messenger,
            Arc::new(|| ChainId::MAINNET),
            Arc::new(|| Some(account())),
            TokensState::default(),
        );

        // Act
        let watcher = {
            let tokens = tokens.clone();
            tokio::spawn(async move { tokens.watch_asset(token(0xdd), "dapp.io").await })
        };
        while approvals.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        let id = approvals.state().pending_approvals.keys().next().cloned().unwrap();
        approvals.accept(&id, None, AcceptOptions::default()).await.unwrap();

        // Assert
        watcher.await.unwrap().unwrap();
        assert_eq!(tokens.tokens(), vec![token(0xdd)]);
    }

    #[tokio::test]
    async fn test_watch_asset_validates_symbol() {
        let (_bus, tokens, _) = controller();
        let mut bad = token(0xaa);
        bad.symbol = "WAYTOOLONGSYMBOL".into();
        assert!(matches!(
            tokens.watch_asset(bad, "dapp.io").await,
            Err(ControllerError::InvalidParams(_))
        ));
    }
}
