//! In-memory implementations of the ports in [`crate::ports`].

pub mod local_provider;
pub mod snap_executor;
pub mod static_sources;

pub use local_provider::{LocalChain, LocalProvider, LocalProviderFactory};
pub use snap_executor::InProcessExecutionService;
pub use static_sources::{
    StaticIncomingTransactionSource, StaticNftSource, StaticPhishingListSource, StaticPriceSource,
    StaticSwapsQuoteSource, StaticTokenListSource, TracingAnalytics,
};
