//! Asset controllers: tokens, NFTs, balances, prices and detection.

pub mod account_tracker;
pub mod balances;
pub mod contract;
pub mod currency_rate;
pub mod detection;
pub mod nft;
pub mod rates;
pub mod token_list;
pub mod tokens;

pub use account_tracker::{AccountTrackerController, AccountTrackerState};
pub use balances::{TokenBalancesController, TokenBalancesState};
pub use contract::AssetsContractController;
pub use currency_rate::{CurrencyRateController, CurrencyRateState};
pub use detection::{NftDetectionController, TokenDetectionController};
pub use nft::{Nft, NftController, NftState};
pub use rates::{TokenRatesController, TokenRatesState};
pub use token_list::{TokenListController, TokenListEntry, TokenListState};
pub use tokens::{Token, TokensController, TokensState};
