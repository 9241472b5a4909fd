//! Background refresh pollers.

use tracing::debug;

use wallet_controllers::Poller;

use crate::container::{EngineContext, PollingConfig};

/// Start every poller. Each one ticks immediately.
pub fn start_pollers(context: &EngineContext, config: &PollingConfig) -> Vec<Poller> {
    vec![
        Poller::spawn("token_list", config.token_list, &context.token_list, |c| async move {
            if let Err(e) = c.fetch_token_list().await {
                debug!(error = %e, "Token list refresh failed");
            }
        }),
        Poller::spawn("token_detection", config.token_detection, &context.token_detection, |c| async move {
            if let Err(e) = c.detect_tokens().await {
                debug!(error = %e, "Token detection failed");
            }
        }),
        Poller::spawn("nft_detection", config.nft_detection, &context.nft_detection, |c| async move {
            if let Err(e) = c.detect_nfts().await {
                debug!(error = %e, "NFT detection failed");
            }
        }),
        Poller::spawn(
            "incoming_transactions",
            config.incoming_transactions,
            &context.transaction,
            |c| async move {
                if let Err(e) = c.update_incoming_transactions().await {
                    debug!(error = %e, "Incoming transaction fetch failed");
                }
            },
        ),
        Poller::spawn("currency_rate", config.currency_rate, &context.currency_rate, |c| async move {
            if let Err(e) = c.update_exchange_rate().await {
                debug!(error = %e, "Exchange rate refresh failed");
            }
        }),
        Poller::spawn("token_rates", config.token_rates, &context.token_rates, |c| async move {
            if let Err(e) = c.update_exchange_rates().await {
                debug!(error = %e, "Token rate refresh failed");
            }
        }),
        Poller::spawn("token_balances", config.token_balances, &context.token_balances, |c| async move {
            if let Err(e) = c.update_balances().await {
                debug!(error = %e, "Token balance refresh failed");
            }
        }),
    ]
}
