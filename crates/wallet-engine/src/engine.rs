//! # Engine
//!
//! A live engine: the bus, every controller, the composed state and the
//! background work wired between them.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use shared_types::{RpcError, U256};
use wallet_controllers::{AcceptOptions, AcceptResult, ControllerBus};

use crate::adapters::EngineServices;
use crate::container::{EngineConfig, EngineContext, InitialState};
use crate::errors::{EngineError, EngineResult};
use crate::state::{EngineState, StateAggregator};
use crate::wiring::EngineTasks;
use wallet_controllers::keyring::KeyringState;

const WEI_PER_ETHER: f64 = 1e18;

/// Options for [`Engine::accept_pending_approval`].
#[derive(Debug, Clone, Copy)]
pub struct AcceptApprovalOptions {
    pub wait_for_result: bool,
    pub delete_after_result: bool,
    /// Swallow accept errors and return `Ok(None)`.
    pub handle_errors: bool,
}

impl Default for AcceptApprovalOptions {
    fn default() -> Self {
        Self {
            wait_for_result: false,
            delete_after_result: false,
            handle_errors: true,
        }
    }
}

/// Options for [`Engine::reject_pending_approval`].
#[derive(Debug, Clone, Copy)]
pub struct RejectApprovalOptions {
    /// Do nothing when no approval has the id.
    pub ignore_missing: bool,
    pub log_errors: bool,
}

impl Default for RejectApprovalOptions {
    fn default() -> Self {
        Self {
            ignore_missing: false,
            log_errors: true,
        }
    }
}

pub struct Engine {
    bus: Arc<ControllerBus>,
    context: EngineContext,
    aggregator: Arc<StateAggregator>,
    tasks: Mutex<EngineTasks>,
}

impl Engine {
    /// Build the controllers, the state aggregator and the wiring.
    #[instrument(name = "engine_build", skip_all)]
    pub async fn build(
        config: &EngineConfig,
        services: &EngineServices,
        initial: &InitialState,
        initial_keyring_state: Option<KeyringState>,
    ) -> EngineResult<Arc<Self>> {
        let bus = Arc::new(ControllerBus::new());
        let context = match EngineContext::build(&bus, config, services, initial, initial_keyring_state).await {
            Ok(context) => context,
            Err(e) => {
                bus.clear_subscriptions();
                bus.clear_action_handlers();
                return Err(e);
            }
        };
        let aggregator = StateAggregator::attach(&bus, &context);
        let tasks = EngineTasks::wire(&bus, &context, config, services);
        info!(?tasks, "Engine ready");

        Ok(Arc::new(Self {
            bus,
            context,
            aggregator,
            tasks: Mutex::new(tasks),
        }))
    }

    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    #[must_use]
    pub fn controller_messenger(&self) -> &Arc<ControllerBus> {
        &self.bus
    }

    /// Composed snapshot. A missing conversion rate reads as zero.
    #[must_use]
    pub fn state(&self) -> EngineState {
        let mut state = self.aggregator.snapshot();
        if state.currency_rate.conversion_rate.is_none() {
            state.currency_rate.conversion_rate = Some(0.0);
        }
        state
    }

    /// Native plus token holdings of the selected account, in the current fiat currency.
    pub fn get_total_fiat_account_balance(&self) -> EngineResult<f64> {
        total_fiat_balance(&EngineState::capture(&self.context))
    }

    /// Whether the selected account holds anything at all.
    ///
    /// Never fails: computation errors are logged and read as no funds.
    #[must_use]
    pub fn has_funds(&self) -> bool {
        let state = EngineState::capture(&self.context);
        match total_fiat_balance(&state) {
            Ok(fiat) => fiat > 0.0 || holds_tokens(&state) || !self.context.nft.current_nfts().is_empty(),
            Err(e) => {
                error!(error = %e, "Error while getting user funds");
                false
            }
        }
    }

    /// Forget everything tied to the previous wallet.
    pub fn reset_state(&self) {
        self.context.permission.clear_state();
        self.context.tokens.clear();
        self.context.nft.clear();
        self.context.token_balances.clear();
        self.context.token_rates.clear();
        self.context.transaction.reset();
        self.context.logging.clear();
        info!("Engine state reset");
    }

    /// Accept a pending approval.
    ///
    /// With `handle_errors` (the default) failures are swallowed and
    /// `Ok(None)` is returned.
    pub async fn accept_pending_approval(
        &self,
        id: &str,
        value: Option<Value>,
        options: AcceptApprovalOptions,
    ) -> EngineResult<Option<AcceptResult>> {
        let accepted = self
            .context
            .approval
            .accept(
                id,
                value,
                AcceptOptions {
                    wait_for_result: options.wait_for_result,
                    delete_after_result: options.delete_after_result,
                },
            )
            .await;
        match accepted {
            Ok(result) => {
                wallet_telemetry::metric_inc!(wallet_telemetry::APPROVALS_RESOLVED, &["accepted"]);
                Ok(Some(result))
            }
            Err(e) if options.handle_errors => {
                warn!(id, error = %e, "Accepting approval failed");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reject a pending approval. Never fails.
    pub fn reject_pending_approval(&self, id: &str, reason: RpcError, options: RejectApprovalOptions) {
        if options.ignore_missing && !self.context.approval.has(id) {
            return;
        }
        match self.context.approval.reject(id, reason) {
            Ok(()) => {
                wallet_telemetry::metric_inc!(wallet_telemetry::APPROVALS_RESOLVED, &["rejected"]);
            }
            Err(e) => {
                if options.log_errors {
                    error!(id, error = %e, "Error while rejecting pending approval");
                }
            }
        }
    }

    /// Tear down: stop background work, drop bus wiring and reset state.
    pub fn shutdown(&self) {
        self.tasks.lock().shutdown(&self.bus);
        self.aggregator.detach(&self.bus);
        self.bus.clear_subscriptions();
        self.bus.clear_action_handlers();
        self.reset_state();
        info!("Engine destroyed");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("context", &self.context)
            .field("tasks", &*self.tasks.lock())
            .finish_non_exhaustive()
    }
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

fn round_for_currency(value: f64, currency: &str) -> f64 {
    if currency.eq_ignore_ascii_case("usd") {
        (value * 100.0).round() / 100.0
    } else {
        value
    }
}

/// Fiat value of the selected account's native and token balances.
///
/// Tokens without a known balance or exchange rate count as zero.
pub fn total_fiat_balance(state: &EngineState) -> EngineResult<f64> {
    let Some(selected) = state.preferences.selected_address.as_ref() else {
        return Ok(0.0);
    };
    let currency = state.currency_rate.current_currency.as_str();
    let conversion = state.currency_rate.conversion_rate.unwrap_or(0.0);

    let native = state
        .account_tracker
        .accounts
        .get(selected)
        .map(|account| {
            round_for_currency(u256_to_f64(account.balance_wei()) / WEI_PER_ETHER * conversion, currency)
        })
        .unwrap_or(0.0);

    let mut tokens = 0.0;
    for token in &state.tokens.tokens {
        let (Some(balance), Some(rate)) = (
            state.token_balances.balance_of(&token.address),
            state.token_rates.contract_exchange_rates.get(&token.address),
        ) else {
            continue;
        };
        let units = u256_to_f64(balance) / 10f64.powi(i32::from(token.decimals));
        tokens += round_for_currency(units * rate * conversion, currency);
    }

    let total = native + tokens;
    if total.is_finite() {
        Ok(total)
    } else {
        Err(EngineError::Balance(format!("non-finite total {total}")))
    }
}

fn holds_tokens(state: &EngineState) -> bool {
    state.tokens.tokens.iter().any(|token| {
        state
            .token_balances
            .balance_of(&token.address)
            .is_some_and(|balance| !balance.is_zero())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::Address;
    use wallet_controllers::assets::account_tracker::AccountInfo;
    use wallet_controllers::assets::tokens::Token;

    fn account() -> Address {
        Address::from_bytes([1u8; 20])
    }

    fn state_with_native(wei: &str, conversion: Option<f64>) -> EngineState {
        let mut state = EngineState::default();
        state.preferences.selected_address = Some(account());
        state.currency_rate.conversion_rate = conversion;
        state.account_tracker.accounts.insert(
            account(),
            AccountInfo {
                balance: wei.to_string(),
            },
        );
        state
    }

    #[test]
    fn test_native_balance_in_fiat() {
        // 0.05 ETH at 2000 usd
        let state = state_with_native("0xb1a2bc2ec50000", Some(2_000.0));
        assert_eq!(total_fiat_balance(&state).unwrap(), 100.0);
    }

    #[test]
    fn test_missing_conversion_rate_reads_as_zero() {
        let state = state_with_native("0xde0b6b3a7640000", None);
        assert_eq!(total_fiat_balance(&state).unwrap(), 0.0);
    }

    #[test]
    fn test_tokens_without_rate_are_skipped() {
        let mut state = state_with_native("0x0", Some(2_000.0));
        let priced = Address::from_bytes([2u8; 20]);
        let unpriced = Address::from_bytes([3u8; 20]);
        state.tokens.tokens = vec![Token::new(priced.clone(), "DAI", 18), Token::new(unpriced.clone(), "XYZ", 6)];
        state
            .token_balances
            .contract_balances
            .insert(priced.clone(), "0xde0b6b3a7640000".to_string());
        state.token_balances.contract_balances.insert(unpriced, "0xf4240".to_string());
        state.token_rates.contract_exchange_rates.insert(priced, 0.0005);

        // 1 DAI * 0.0005 ETH * 2000
        assert_eq!(total_fiat_balance(&state).unwrap(), 1.0);
        assert!(holds_tokens(&state));
    }

    #[test]
    fn test_zero_token_balance_is_not_holding() {
        let mut state = EngineState::default();
        let token = Address::from_bytes([2u8; 20]);
        state.tokens.tokens = vec![Token::new(token.clone(), "DAI", 18)];
        state.token_balances.contract_balances.insert(token, "0x0".to_string());
        assert!(!holds_tokens(&state));
    }

    #[test]
    fn test_no_selected_account_has_zero_balance() {
        assert_eq!(total_fiat_balance(&EngineState::default()).unwrap(), 0.0);
    }

    #[test]
    fn test_u256_conversion_spans_limbs() {
        let value = U256::from(u64::MAX) + U256::from(1u64);
        assert_eq!(u256_to_f64(value), 18_446_744_073_709_551_616.0);
    }
}
