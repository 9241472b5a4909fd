//! # Currency Rate Controller
//!
//! Conversion rate from the network's native currency to the user's fiat
//! currency. `conversion_rate` stays `None` until a rate has been fetched.

use crate::base::{BaseController, ControllerState};
use crate::errors::{ControllerError, ControllerResult};
use crate::messaging::{events, ControllerEvent, ControllerMessenger, ControllerName, StateSlice};
use crate::ports::PriceSource;
use serde::{Deserialize, Serialize};
use shared_types::now_millis;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Refresh interval used by the engine's poller.
pub const POLLING_INTERVAL: std::time::Duration = std::time::Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyRateState {
    pub current_currency: String,
    pub native_currency: String,
    pub conversion_rate: Option<f64>,
    pub conversion_date: Option<u64>,
    pub usd_conversion_rate: Option<f64>,
}

impl Default for CurrencyRateState {
    fn default() -> Self {
        Self {
            current_currency: "usd".to_string(),
            native_currency: "ETH".to_string(),
            conversion_rate: None,
            conversion_date: None,
            usd_conversion_rate: None,
        }
    }
}

impl ControllerState for CurrencyRateState {
    const NAME: ControllerName = ControllerName::CurrencyRate;

    fn into_slice(self) -> StateSlice {
        StateSlice::CurrencyRate(self)
    }
}

pub struct CurrencyRateController {
    base: BaseController<CurrencyRateState>,
    source: Arc<dyn PriceSource>,
}

impl CurrencyRateController {
    /// Create the controller and follow the network's native currency.
    ///
    /// The messenger must allow `NetworkController:networkDidChange`.
    pub fn new(
        messenger: Arc<ControllerMessenger>,
        source: Arc<dyn PriceSource>,
        initial: CurrencyRateState,
    ) -> ControllerResult<Arc<Self>> {
        let controller = Arc::new(Self {
            base: BaseController::new(Arc::clone(&messenger), initial),
            source,
        });

        let weak: Weak<Self> = Arc::downgrade(&controller);
        messenger.subscribe(
            events::NETWORK_DID_CHANGE,
            Arc::new(move |event: &ControllerEvent| {
                let ControllerEvent::NetworkDidChange(config) = event else {
                    return;
                };
                let Some(controller) = weak.upgrade() else {
                    return;
                };
                let ticker = config.ticker.clone();
                controller
                    .base
                    .update(|state| state.native_currency = ticker);
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        let _ = controller.update_exchange_rate().await;
                    });
                }
            }),
        )?;

        Ok(controller)
    }

    #[must_use]
    pub fn state(&self) -> CurrencyRateState {
        self.base.state()
    }

    /// Fetch the rate once. Called by the engine at startup and by its poller.
    pub async fn start(&self) {
        if let Err(e) = self.update_exchange_rate().await {
            warn!(error = %e, "Initial exchange rate fetch failed");
        }
    }

    /// Refresh `conversion_rate` and `usd_conversion_rate`.
    ///
    /// On failure the previous rates are kept.
    pub async fn update_exchange_rate(&self) -> ControllerResult<()> {
        let (native, fiat) = self
            .base
            .read(|s| (s.native_currency.clone(), s.current_currency.clone()));

        let rate = self.source.conversion_rate(&native, &fiat).await?;
        let usd_rate = if fiat.eq_ignore_ascii_case("usd") {
            Some(rate)
        } else {
            self.source.conversion_rate(&native, "usd").await.ok()
        };

        if !rate.is_finite() || rate < 0.0 {
            return Err(ControllerError::Source(format!("invalid rate {rate}")));
        }

        debug!(native = %native, fiat = %fiat, rate, "Exchange rate updated");
        self.base.update(|state| {
            state.conversion_rate = Some(rate);
            state.usd_conversion_rate = usd_rate;
            state.conversion_date = Some(now_millis() / 1000);
        });
        Ok(())
    }

    pub async fn set_current_currency(&self, currency: &str) -> ControllerResult<()> {
        let currency = currency.to_ascii_lowercase();
        self.base.update(|state| state.current_currency = currency);
        self.update_exchange_rate().await
    }

    pub async fn set_native_currency(&self, ticker: &str) -> ControllerResult<()> {
        let ticker = ticker.to_string();
        self.base.update(|state| state.native_currency = ticker);
        self.update_exchange_rate().await
    }

    /// Apply caller-supplied state after construction.
    pub fn update(&self, next: CurrencyRateState) {
        self.base.replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticPriceSource;
    use crate::test_support::messenger_for;

    #[tokio::test]
    async fn test_rate_is_none_until_fetched() {
        let (_bus, messenger) =
            messenger_for(ControllerName::CurrencyRate, &[], &[events::NETWORK_DID_CHANGE]);
        let source = Arc::new(StaticPriceSource::default().with_rate("ETH", "usd", 2000.0));
        let rates = CurrencyRateController::new(messenger, source, CurrencyRateState::default()).unwrap();
        assert_eq!(rates.state().conversion_rate, None);

        rates.start().await;

        assert_eq!(rates.state().conversion_rate, Some(2000.0));
        assert_eq!(rates.state().usd_conversion_rate, Some(2000.0));
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_rate() {
        let (_bus, messenger) =
            messenger_for(ControllerName::CurrencyRate, &[], &[events::NETWORK_DID_CHANGE]);
        let source = Arc::new(StaticPriceSource::default().with_rate("ETH", "usd", 1500.0));
        let rates = CurrencyRateController::new(messenger, source, CurrencyRateState::default()).unwrap();
        rates.start().await;

        assert!(rates.set_current_currency("xyz").await.is_err());

        assert_eq!(rates.state().conversion_rate, Some(1500.0));
        assert_eq!(rates.state().current_currency, "xyz");
    }
}
