use log::warn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset_classification::same_symbol;
use super::lot_accounting::{is_quantity_significant, recompute, LotAggregates};
use crate::transactions::Transaction;

/// A position in one ticker within one portfolio.
///
/// `quantity`, `total_cost_basis` and `avg_buy_price` are derived from
/// `transactions` and only ever written by [`Asset::recalculate_aggregates`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub ticker: String,
    pub name: String,
    pub quantity: Decimal,
    pub current_price: Decimal,
    pub currency: String,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    pub total_cost_basis: Decimal,
    pub avg_buy_price: Decimal,
    /// Last price refresh failed; `current_price` is from an earlier refresh.
    #[serde(default)]
    pub price_stale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_error: Option<String>,
}

impl Asset {
    pub fn new(ticker: &str, name: Option<&str>, currency: &str) -> Self {
        let ticker = ticker.trim().to_uppercase();
        Asset {
            id: Uuid::new_v4().to_string(),
            name: name
                .map(str::to_string)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| ticker.clone()),
            ticker,
            quantity: Decimal::ZERO,
            current_price: Decimal::ZERO,
            currency: currency.trim().to_uppercase(),
            transactions: Vec::new(),
            total_cost_basis: Decimal::ZERO,
            avg_buy_price: Decimal::ZERO,
            price_stale: false,
            price_error: None,
        }
    }

    pub fn aggregates(&self) -> LotAggregates {
        LotAggregates {
            quantity: self.quantity,
            total_cost_basis: self.total_cost_basis,
            avg_buy_price: self.avg_buy_price,
        }
    }

    /// Re-derives quantity, cost basis and average price from the transaction list.
    pub fn recalculate_aggregates(&mut self) {
        let aggregates = recompute(&self.transactions);
        if aggregates.quantity.is_sign_negative() && is_quantity_significant(&aggregates.quantity) {
            warn!(
                "Asset {} ({}) quantity became negative ({}) after recalculation.",
                self.ticker, self.id, aggregates.quantity
            );
        }
        self.quantity = aggregates.quantity;
        self.total_cost_basis = aggregates.total_cost_basis;
        self.avg_buy_price = aggregates.avg_buy_price;
    }

    /// Nothing left to hold: the asset should leave its portfolio.
    pub fn is_depleted(&self) -> bool {
        !is_quantity_significant(&self.quantity)
    }

    pub fn matches_ticker(&self, ticker: &str) -> bool {
        self.ticker.eq_ignore_ascii_case(ticker.trim())
    }

    pub fn matches_symbol(&self, ticker: &str) -> bool {
        same_symbol(&self.ticker, ticker)
    }

    pub fn find_transaction(&self, transaction_id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.id == transaction_id)
    }

    pub fn find_transaction_mut(&mut self, transaction_id: &str) -> Option<&mut Transaction> {
        self.transactions.iter_mut().find(|tx| tx.id == transaction_id)
    }

    /// Appends a transaction and recomputes aggregates.
    pub fn push_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
        self.recalculate_aggregates();
    }

    /// Removes a transaction by id, recomputing aggregates. Returns the removed record.
    pub fn remove_transaction(&mut self, transaction_id: &str) -> Option<Transaction> {
        let index = self.transactions.iter().position(|tx| tx.id == transaction_id)?;
        let removed = self.transactions.remove(index);
        self.recalculate_aggregates();
        Some(removed)
    }

    /// Quantity the asset would hold without the given transaction.
    pub fn quantity_without(&self, transaction_id: &str) -> Decimal {
        let remaining: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|tx| tx.id != transaction_id)
            .cloned()
            .collect();
        recompute(&remaining).quantity
    }
}
