//! Market data seam - quote model, provider trait, and a snapshot-backed provider.

mod market_data_errors;
mod market_data_model;
mod market_data_traits;
mod snapshot_provider;

pub use market_data_errors::MarketDataError;
pub use market_data_model::{PriceQuote, PriceSnapshot};
pub use market_data_traits::MarketDataProviderTrait;
pub use snapshot_provider::SnapshotMarketDataProvider;
