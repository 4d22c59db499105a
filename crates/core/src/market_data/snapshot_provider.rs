use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::market_data_errors::MarketDataError;
use super::market_data_model::{PriceQuote, PriceSnapshot};
use super::market_data_traits::MarketDataProviderTrait;
use crate::errors::{Error, Result};

/// Serves quotes from manually recorded price snapshots.
#[derive(Clone, Default)]
pub struct SnapshotMarketDataProvider {
    snapshots: Arc<RwLock<BTreeMap<String, PriceSnapshot>>>,
}

impl SnapshotMarketDataProvider {
    pub fn new(snapshots: BTreeMap<String, PriceSnapshot>) -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(snapshots)),
        }
    }

    /// Replaces the served snapshots, e.g. after an import.
    pub fn replace(&self, snapshots: BTreeMap<String, PriceSnapshot>) -> Result<()> {
        let mut guard = self
            .snapshots
            .write()
            .map_err(|e| Error::Unexpected(e.to_string()))?;
        *guard = snapshots;
        Ok(())
    }

    pub fn upsert(&self, ticker: &str, snapshot: PriceSnapshot) -> Result<()> {
        let mut guard = self
            .snapshots
            .write()
            .map_err(|e| Error::Unexpected(e.to_string()))?;
        guard.insert(ticker.trim().to_uppercase(), snapshot);
        Ok(())
    }
}

#[async_trait]
impl MarketDataProviderTrait for SnapshotMarketDataProvider {
    async fn fetch_quote(&self, ticker: &str) -> Result<PriceQuote> {
        let key = ticker.trim().to_uppercase();
        let guard = self
            .snapshots
            .read()
            .map_err(|e| Error::Unexpected(e.to_string()))?;
        let snapshot = guard
            .get(&key)
            .ok_or_else(|| MarketDataError::NotFound(format!("No price snapshot for {}", key)))?;
        Ok(PriceQuote {
            ticker: key,
            price: snapshot.price,
            display_name: snapshot.display_name.clone(),
            currency: snapshot.currency.clone(),
        })
    }
}
