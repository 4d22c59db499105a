use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::closed_positions_model::ClosedPosition;
use crate::assets::Asset;
use crate::market_data::PriceSnapshot;
use crate::transactions::Transaction;

/// Owns a set of assets (one per ticker) and the closed positions realized in it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub closed_positions: Vec<ClosedPosition>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(name: &str) -> Self {
        Portfolio {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            assets: Vec::new(),
            closed_positions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn find_asset(&self, asset_id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == asset_id)
    }

    pub fn find_asset_mut(&mut self, asset_id: &str) -> Option<&mut Asset> {
        self.assets.iter_mut().find(|a| a.id == asset_id)
    }

    pub fn find_asset_by_ticker(&self, ticker: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.matches_ticker(ticker))
    }

    pub fn find_asset_by_ticker_mut(&mut self, ticker: &str) -> Option<&mut Asset> {
        self.assets.iter_mut().find(|a| a.matches_ticker(ticker))
    }

    /// Returns the asset for `ticker`, creating an empty one when absent.
    pub fn asset_for_ticker_mut(
        &mut self,
        ticker: &str,
        name: Option<&str>,
        currency: &str,
    ) -> &mut Asset {
        match self.assets.iter().position(|a| a.matches_ticker(ticker)) {
            Some(index) => &mut self.assets[index],
            None => {
                self.assets.push(Asset::new(ticker, name, currency));
                let last = self.assets.len() - 1;
                &mut self.assets[last]
            }
        }
    }

    /// Finds a transaction anywhere in the portfolio with its owning asset.
    pub fn find_transaction(&self, transaction_id: &str) -> Option<(&Asset, &Transaction)> {
        self.assets.iter().find_map(|asset| {
            asset
                .find_transaction(transaction_id)
                .map(|tx| (asset, tx))
        })
    }

    /// Drops assets whose quantity netted to zero.
    /// Removes assets holding nothing, except those `keep` accepts.
    pub fn remove_depleted_assets(&mut self, keep: impl Fn(&Asset) -> bool) -> Vec<Asset> {
        let (depleted, kept): (Vec<Asset>, Vec<Asset>) =
            self.assets.drain(..).partition(|a| a.is_depleted() && !keep(a));
        self.assets = kept;
        depleted
    }

    pub fn closed_positions_for_sell(&self, sell_transaction_id: &str) -> Vec<&ClosedPosition> {
        self.closed_positions
            .iter()
            .filter(|cp| cp.sell_transaction_id == sell_transaction_id)
            .collect()
    }
}

/// Every portfolio plus out-of-band price snapshots. The unit the engine
/// transforms: operations take a `&LedgerState` and return a new one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LedgerState {
    #[serde(default)]
    pub portfolios: Vec<Portfolio>,
    #[serde(default)]
    pub price_snapshots: BTreeMap<String, PriceSnapshot>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_portfolio(&self, portfolio_id: &str) -> Option<&Portfolio> {
        self.portfolios.iter().find(|p| p.id == portfolio_id)
    }

    pub fn find_portfolio_mut(&mut self, portfolio_id: &str) -> Option<&mut Portfolio> {
        self.portfolios.iter_mut().find(|p| p.id == portfolio_id)
    }

    /// Next creation sequence: one past the highest in the ledger, closed
    /// positions included so recreated lots never collide.
    pub fn next_sequence(&self) -> u64 {
        let from_transactions = self
            .portfolios
            .iter()
            .flat_map(|p| p.assets.iter())
            .flat_map(|a| a.transactions.iter())
            .map(|tx| tx.sequence);
        let from_closed = self
            .portfolios
            .iter()
            .flat_map(|p| p.closed_positions.iter())
            .map(|cp| cp.entry_sequence);
        from_transactions
            .chain(from_closed)
            .max()
            .map(|max| max + 1)
            .unwrap_or(1)
    }
}
