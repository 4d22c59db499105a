use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::RATE_REFERENCE_CURRENCY;

/// Map of currency code to its rate relative to USD (units of the currency per 1 USD).
///
/// Captured on a transaction at creation so historical conversions never drift
/// when live rates move. Kept ordered so serialized bundles are stable.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct RateSnapshot(pub BTreeMap<String, Decimal>);

impl RateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot containing only the reference currency.
    pub fn reference_only() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(RATE_REFERENCE_CURRENCY.to_string(), Decimal::ONE);
        RateSnapshot(rates)
    }

    pub fn with_rate(mut self, currency: &str, rate: Decimal) -> Self {
        self.insert(currency, rate);
        self
    }

    pub fn insert(&mut self, currency: &str, rate: Decimal) {
        self.0.insert(normalize_code(currency), rate);
    }

    /// Rate for a currency; the reference currency is always 1.
    pub fn rate(&self, currency: &str) -> Option<Decimal> {
        let code = normalize_code(currency);
        if code == RATE_REFERENCE_CURRENCY {
            return Some(Decimal::ONE);
        }
        self.0
            .get(&code)
            .copied()
            .filter(|rate| rate.is_sign_positive() && !rate.is_zero())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fills currencies missing here from `other`, keeping existing entries.
    pub fn merged_with(&self, other: &RateSnapshot) -> RateSnapshot {
        let mut merged = self.0.clone();
        for (code, rate) in &other.0 {
            merged.entry(code.clone()).or_insert(*rate);
        }
        RateSnapshot(merged)
    }
}

pub(crate) fn normalize_code(currency: &str) -> String {
    currency.trim().to_uppercase()
}
