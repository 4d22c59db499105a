use async_trait::async_trait;

use super::market_data_model::PriceQuote;
use crate::errors::Result;

/// Live price/name lookup. Failures leave the asset's last price in place
/// and flag it stale; they never block a ledger mutation.
#[async_trait]
pub trait MarketDataProviderTrait: Send + Sync {
    async fn fetch_quote(&self, ticker: &str) -> Result<PriceQuote>;
}
