//! Transaction domain models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::transactions_constants::*;
use crate::fx::RateSnapshot;

/// Enum representing the ledger event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    #[default]
    Buy,
    Sell,
    Deposit,
    Withdrawal,
    Transfer,
    Income,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => TRANSACTION_TYPE_BUY,
            TransactionType::Sell => TRANSACTION_TYPE_SELL,
            TransactionType::Deposit => TRANSACTION_TYPE_DEPOSIT,
            TransactionType::Withdrawal => TRANSACTION_TYPE_WITHDRAWAL,
            TransactionType::Transfer => TRANSACTION_TYPE_TRANSFER,
            TransactionType::Income => TRANSACTION_TYPE_INCOME,
        }
    }

    /// BUY, DEPOSIT and INCOME add lots.
    pub fn is_acquisition(&self) -> bool {
        is_acquisition_type(self.as_str())
    }

    /// SELL, WITHDRAWAL and TRANSFER consume lots.
    pub fn is_disposal(&self) -> bool {
        is_disposal_type(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            TRANSACTION_TYPE_BUY => Ok(TransactionType::Buy),
            TRANSACTION_TYPE_SELL => Ok(TransactionType::Sell),
            TRANSACTION_TYPE_DEPOSIT => Ok(TransactionType::Deposit),
            TRANSACTION_TYPE_WITHDRAWAL => Ok(TransactionType::Withdrawal),
            TRANSACTION_TYPE_TRANSFER => Ok(TransactionType::Transfer),
            TRANSACTION_TYPE_INCOME => Ok(TransactionType::Income),
            other => Err(format!("Unknown transaction type: {}", other)),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single ledger event. Immutable once created, except for lot restoration
/// and destination-side transfer splitting which resize acquisition lots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub price_per_coin: Decimal,
    pub date: NaiveDate,
    /// Acquisitions: amount paid. Disposals: FIFO cost basis removed.
    pub total_cost: Decimal,
    pub tag: String,
    pub created_at: DateTime<Utc>,
    /// Creation order across the whole ledger; secondary FIFO key after `date`.
    #[serde(default)]
    pub sequence: u64,
    pub purchase_currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rate_at_purchase: Option<RateSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    // BUY funded by spending another asset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_quantity: Option<Decimal>,

    // SELL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proceeds_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ticker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_quantity: Option<Decimal>,
    /// Value received, in the sold asset's currency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proceeds: Option<Decimal>,

    // Swap pair
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_buy_sell_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_pair_id: Option<String>,

    // TRANSFER
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_portfolio_id: Option<String>,

    // Provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposit_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_source: Option<String>,

    /// Set on read-only lot copies created by a transfer: the source portfolio id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transferred_from: Option<String>,
    /// Id of the TRANSFER transaction that produced this copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_transaction_id: Option<String>,
}

impl Transaction {
    /// New record with `total_cost = quantity × price_per_coin`.
    pub fn new(
        transaction_type: TransactionType,
        quantity: Decimal,
        price_per_coin: Decimal,
        date: NaiveDate,
        purchase_currency: &str,
        tag: &str,
        sequence: u64,
    ) -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            transaction_type,
            quantity,
            price_per_coin,
            date,
            total_cost: quantity * price_per_coin,
            tag: tag.to_string(),
            created_at: Utc::now(),
            sequence,
            purchase_currency: purchase_currency.to_string(),
            ..Default::default()
        }
    }

    /// New disposal record whose total is the cost basis it removes.
    /// `price_per_coin` is the unit cost of the consumed lots.
    pub fn disposal(
        transaction_type: TransactionType,
        quantity: Decimal,
        cost_basis: Decimal,
        date: NaiveDate,
        currency: &str,
        tag: &str,
        sequence: u64,
    ) -> Self {
        let unit_cost = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            cost_basis / quantity
        };
        Transaction {
            total_cost: cost_basis,
            ..Transaction::new(transaction_type, quantity, unit_cost, date, currency, tag, sequence)
        }
    }

    pub fn is_acquisition(&self) -> bool {
        self.transaction_type.is_acquisition()
    }

    pub fn is_disposal(&self) -> bool {
        self.transaction_type.is_disposal()
    }

    /// Part of a BUY/SELL pair created together as one swap.
    pub fn is_linked(&self) -> bool {
        self.linked_buy_sell_transaction_id.is_some() || self.transaction_pair_id.is_some()
    }

    /// Read-only copy owned by a transfer destination.
    pub fn is_transfer_copy(&self) -> bool {
        self.transferred_from.is_some()
    }

    /// Ticker received in exchange for a SELL, if any.
    pub fn proceeds_ticker(&self) -> Option<&str> {
        self.destination_ticker
            .as_deref()
            .or(self.proceeds_currency.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// FIFO ordering key: oldest date first, then creation order.
    pub fn fifo_key(&self) -> (NaiveDate, u64) {
        (self.date, self.sequence)
    }

    /// Drops every swap/transfer linkage field. Used when cutting lot copies.
    pub fn without_linkage(mut self) -> Self {
        self.linked_buy_sell_transaction_id = None;
        self.transaction_pair_id = None;
        self.source_ticker = None;
        self.source_quantity = None;
        self.transferred_from = None;
        self.transfer_transaction_id = None;
        self
    }

    /// Resizes an acquisition lot, keeping its unit price and prorating cost.
    pub fn resize_lot(&mut self, new_quantity: Decimal) {
        if self.quantity.is_zero() {
            self.total_cost = new_quantity * self.price_per_coin;
        } else {
            self.total_cost = self.total_cost * new_quantity / self.quantity;
        }
        self.quantity = new_quantity;
    }
}

/// Patch applied by `edit_transaction`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEdit {
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub price_per_coin: Option<Decimal>,
    #[serde(default)]
    pub total_cost: Option<Decimal>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransactionEdit {
    /// True when the patch touches quantity, price, total or date.
    pub fn changes_economics(&self, current: &Transaction) -> bool {
        self.quantity.is_some_and(|q| q != current.quantity)
            || self.price_per_coin.is_some_and(|p| p != current.price_per_coin)
            || self.total_cost.is_some_and(|t| t != current.total_cost)
            || self.date.is_some_and(|d| d != current.date)
    }

    /// Resolves `(quantity, price_per_coin, total_cost)` for an acquisition so
    /// that `total_cost = quantity × price_per_coin` holds.
    ///
    /// An explicit price wins over an explicit total; a lone total re-derives
    /// the price.
    pub fn derive_amounts(&self, current: &Transaction) -> (Decimal, Decimal, Decimal) {
        let quantity = self.quantity.unwrap_or(current.quantity);
        let price = match (self.price_per_coin, self.total_cost) {
            (Some(price), _) => price,
            (None, Some(total)) if !quantity.is_zero() => total / quantity,
            _ => current.price_per_coin,
        };
        (quantity, price, quantity * price)
    }

    pub fn apply_metadata(&self, transaction: &mut Transaction) {
        if let Some(tag) = &self.tag {
            transaction.tag = tag.clone();
        }
        if let Some(notes) = &self.notes {
            transaction.notes = if notes.trim().is_empty() {
                None
            } else {
                Some(notes.clone())
            };
        }
    }
}
