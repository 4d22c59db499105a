use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of a live price/name lookup for one ticker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub ticker: String,
    pub price: Decimal,
    pub display_name: Option<String>,
    pub currency: String,
}

/// Out-of-band price kept alongside the ledger and exported with it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceSnapshot {
    pub price: Decimal,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub fetched_at: DateTime<Utc>,
}
