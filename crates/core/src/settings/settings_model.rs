use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CURRENCY;
use crate::fx::RateSnapshot;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSettings {
    /// Currency realized P&L is reported in.
    #[serde(default = "default_display_currency")]
    pub display_currency: String,
    /// Last-known rates used when a transaction carries no snapshot for a currency.
    #[serde(default = "RateSnapshot::reference_only")]
    pub fallback_rates: RateSnapshot,
}

fn default_display_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            display_currency: default_display_currency(),
            fallback_rates: RateSnapshot::reference_only(),
        }
    }
}

impl LedgerSettings {
    pub fn with_display_currency(mut self, currency: &str) -> Self {
        self.display_currency = currency.trim().to_uppercase();
        self
    }

    pub fn with_fallback_rates(mut self, rates: RateSnapshot) -> Self {
        self.fallback_rates = RateSnapshot::reference_only().merged_with(&rates);
        self
    }
}
