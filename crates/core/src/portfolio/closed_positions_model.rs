use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fx::RateSnapshot;
use crate::transactions::TransactionType;

/// One FIFO match between an acquisition lot and a disposal.
///
/// Entry values are in the lot's own currency so the lot can be recreated
/// exactly when the disposal is reversed; P&L is in the display currency.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClosedPosition {
    pub id: String,
    pub ticker: String,
    pub sell_transaction_id: String,
    pub buy_transaction_id: String,

    pub entry_date: NaiveDate,
    pub entry_price: Decimal,
    pub entry_quantity: Decimal,
    pub entry_cost_basis: Decimal,
    pub entry_currency: String,
    pub entry_tag: String,
    #[serde(default)]
    pub entry_type: TransactionType,
    #[serde(default)]
    pub entry_sequence: u64,
    #[serde(default = "Utc::now")]
    pub entry_created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_exchange_rates: Option<RateSnapshot>,

    pub exit_date: NaiveDate,
    pub exit_price: Decimal,
    pub exit_quantity: Decimal,
    pub exit_proceeds: Decimal,
    pub exit_currency: String,
    pub exit_tag: String,
    /// Ticker the sale was paid in; lets the chain tracker follow removed assets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proceeds_ticker: Option<String>,

    #[serde(default)]
    pub cost_basis_display: Decimal,
    #[serde(default)]
    pub proceeds_display: Decimal,
    pub realized_pnl: Decimal,
    pub realized_pnl_percent: Decimal,
    pub pnl_currency: String,
    pub holding_period_days: i64,
    pub closed_at: DateTime<Utc>,
}

/// Realized totals for one ticker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TickerRealized {
    pub ticker: String,
    pub positions: usize,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub proceeds: Decimal,
    pub realized_pnl: Decimal,
}

/// Realized P&L of a portfolio, handed to the summary and risk layers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RealizedSummary {
    pub portfolio_id: String,
    pub currency: String,
    pub total_realized_pnl: Decimal,
    pub by_ticker: BTreeMap<String, TickerRealized>,
}
