use async_trait::async_trait;
use chrono::NaiveDate;

use super::fx_model::RateSnapshot;
use crate::errors::Result;

/// Source of historical FX snapshots used to stamp new transactions.
#[async_trait]
pub trait FxRateProviderTrait: Send + Sync {
    /// Rates relative to USD as of `date`.
    async fn fetch_rates_for_date(&self, date: NaiveDate) -> Result<RateSnapshot>;
}

/// Provider returning one fixed rate map for every date.
#[derive(Debug, Clone, Default)]
pub struct StaticFxRateProvider {
    rates: RateSnapshot,
}

impl StaticFxRateProvider {
    pub fn new(rates: RateSnapshot) -> Self {
        Self { rates }
    }
}

#[async_trait]
impl FxRateProviderTrait for StaticFxRateProvider {
    async fn fetch_rates_for_date(&self, _date: NaiveDate) -> Result<RateSnapshot> {
        Ok(self.rates.clone())
    }
}
