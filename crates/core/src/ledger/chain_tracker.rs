//! Swap chain discovery.
//!
//! Edges of the implicit graph are sales: a SELL of `A` paid in `B` is an edge
//! `A -> B`. Hops whose SELL has since disappeared with its asset are recovered
//! from the closed positions it produced.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::assets::{base_symbol, same_symbol};
use crate::portfolio::Portfolio;
use crate::transactions::{Transaction, TransactionType};

/// One hop: `source_ticker` was sold for `proceeds_ticker`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainLink {
    pub source_ticker: String,
    pub proceeds_ticker: String,
    /// Asset holding the SELL; absent when only closed positions remain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    pub sell_transaction_id: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

impl ChainLink {
    pub fn describe(&self) -> String {
        format!(
            "{} {} sold for {} on {}",
            self.quantity.normalize(),
            self.source_ticker,
            self.proceeds_ticker,
            self.date
        )
    }
}

/// Every hop reachable from `start_ticker`, depth-first in discovery order.
pub fn find_chain(start_ticker: &str, portfolio: &Portfolio) -> Vec<ChainLink> {
    find_chain_from(start_ticker, portfolio, HashSet::new()).0
}

/// Depth-first traversal with an explicit stack. `visited` holds base symbols
/// already expanded; it is extended and handed back so callers can continue a
/// search without revisiting.
pub fn find_chain_from(
    start_ticker: &str,
    portfolio: &Portfolio,
    mut visited: HashSet<String>,
) -> (Vec<ChainLink>, HashSet<String>) {
    let mut chain = Vec::new();
    let start = base_symbol(start_ticker);
    if !visited.insert(start.clone()) {
        return (chain, visited);
    }

    let mut stack: Vec<ChainLink> = direct_sales(&start, portfolio);
    stack.reverse();

    while let Some(link) = stack.pop() {
        let next = base_symbol(&link.proceeds_ticker);
        chain.push(link);
        if visited.insert(next.clone()) {
            let mut hops = direct_sales(&next, portfolio);
            hops.reverse();
            stack.extend(hops);
        }
    }

    (chain, visited)
}

/// Sales of `symbol` that were paid in another asset, oldest first.
pub fn direct_sales(symbol: &str, portfolio: &Portfolio) -> Vec<ChainLink> {
    let mut links: Vec<(u64, ChainLink)> = Vec::new();
    let mut seen_sells: HashSet<&str> = HashSet::new();

    for asset in portfolio.assets.iter().filter(|a| a.matches_symbol(symbol)) {
        for tx in asset
            .transactions
            .iter()
            .filter(|tx| tx.transaction_type == TransactionType::Sell)
        {
            let Some(proceeds) = tx.proceeds_ticker() else {
                continue;
            };
            if same_symbol(proceeds, &asset.ticker) {
                continue;
            }
            seen_sells.insert(tx.id.as_str());
            links.push((
                tx.sequence,
                ChainLink {
                    source_ticker: asset.ticker.clone(),
                    proceeds_ticker: proceeds.to_uppercase(),
                    asset_id: Some(asset.id.clone()),
                    sell_transaction_id: tx.id.clone(),
                    date: tx.date,
                    quantity: tx.quantity,
                    transaction: Some(tx.clone()),
                },
            ));
        }
    }

    // Sales whose asset was removed only survive in their closed positions.
    let mut orphaned: BTreeMap<&str, ChainLink> = BTreeMap::new();
    for cp in portfolio
        .closed_positions
        .iter()
        .filter(|cp| same_symbol(&cp.ticker, symbol))
        .filter(|cp| !seen_sells.contains(cp.sell_transaction_id.as_str()))
    {
        let Some(proceeds) = cp.proceeds_ticker.as_deref() else {
            continue;
        };
        orphaned
            .entry(cp.sell_transaction_id.as_str())
            .and_modify(|link| link.quantity += cp.exit_quantity)
            .or_insert_with(|| ChainLink {
                source_ticker: cp.ticker.clone(),
                proceeds_ticker: proceeds.to_uppercase(),
                asset_id: None,
                sell_transaction_id: cp.sell_transaction_id.clone(),
                date: cp.exit_date,
                quantity: cp.exit_quantity,
                transaction: None,
            });
    }
    links.extend(orphaned.into_values().map(|link| (u64::MAX, link)));

    links.sort_by(|(seq_a, a), (seq_b, b)| a.date.cmp(&b.date).then(seq_a.cmp(seq_b)));
    links.into_iter().map(|(_, link)| link).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::Asset;
    use crate::portfolio::ClosedPosition;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
    }

    fn sell_for(qty: Decimal, proceeds: &str, d: u32, seq: u64) -> Transaction {
        let mut tx =
            Transaction::disposal(TransactionType::Sell, qty, dec!(0), day(d), "USD", "DCA", seq);
        tx.destination_ticker = Some(proceeds.to_string());
        tx
    }

    fn asset_with(ticker: &str, txs: Vec<Transaction>) -> Asset {
        let mut asset = Asset::new(ticker, None, "USD");
        let mut buy = Transaction::new(TransactionType::Buy, dec!(100), dec!(1), day(1), "USD", "DCA", 0);
        buy.quantity = dec!(100);
        asset.push_transaction(buy);
        for tx in txs {
            asset.push_transaction(tx);
        }
        asset
    }

    fn portfolio(assets: Vec<Asset>) -> Portfolio {
        let mut p = Portfolio::new("Main");
        p.assets = assets;
        p
    }

    #[test]
    fn test_two_hop_chain_in_order() {
        let p = portfolio(vec![
            asset_with("BTC", vec![sell_for(dec!(1), "ETH", 2, 1)]),
            asset_with("ETH", vec![sell_for(dec!(20), "SOL", 3, 2)]),
            asset_with("SOL", vec![]),
        ]);
        let chain = find_chain("BTC", &p);
        let hops: Vec<(&str, &str)> = chain
            .iter()
            .map(|l| (l.source_ticker.as_str(), l.proceeds_ticker.as_str()))
            .collect();
        assert_eq!(hops, vec![("BTC", "ETH"), ("ETH", "SOL")]);
    }

    #[test]
    fn test_cycle_terminates() {
        let p = portfolio(vec![
            asset_with("BTC", vec![sell_for(dec!(1), "ETH", 2, 1)]),
            asset_with("ETH", vec![sell_for(dec!(1), "BTC", 3, 2)]),
        ]);
        let (chain, visited) = find_chain_from("BTC", &p, HashSet::new());
        assert_eq!(chain.len(), 2);
        assert!(visited.contains("BTC") && visited.contains("ETH"));
    }

    #[test]
    fn test_visited_set_short_circuits() {
        let p = portfolio(vec![asset_with("BTC", vec![sell_for(dec!(1), "ETH", 2, 1)])]);
        let visited: HashSet<String> = ["BTC".to_string()].into_iter().collect();
        let (chain, _) = find_chain_from("btc", &p, visited);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_qualified_ticker_shares_base_symbol() {
        let p = portfolio(vec![asset_with("ETH (Arbitrum)", vec![sell_for(dec!(1), "USDC", 2, 1)])]);
        assert_eq!(find_chain("ETH", &p).len(), 1);
    }

    #[test]
    fn test_removed_asset_hops_come_from_closed_positions() {
        let mut p = portfolio(vec![asset_with("ETH", vec![])]);
        p.closed_positions.push(ClosedPosition {
            id: "cp".into(),
            ticker: "BTC".into(),
            sell_transaction_id: "sell-1".into(),
            buy_transaction_id: "buy-1".into(),
            entry_date: day(1),
            entry_price: dec!(100),
            entry_quantity: dec!(1),
            entry_cost_basis: dec!(100),
            entry_currency: "USD".into(),
            entry_tag: "DCA".into(),
            entry_type: TransactionType::Buy,
            entry_sequence: 1,
            entry_created_at: Utc::now(),
            entry_exchange_rates: None,
            exit_date: day(4),
            exit_price: dec!(150),
            exit_quantity: dec!(1),
            exit_proceeds: dec!(150),
            exit_currency: "USD".into(),
            exit_tag: "DCA".into(),
            proceeds_ticker: Some("ETH".into()),
            cost_basis_display: dec!(100),
            proceeds_display: dec!(150),
            realized_pnl: dec!(50),
            realized_pnl_percent: dec!(50),
            pnl_currency: "USD".into(),
            holding_period_days: 3,
            closed_at: Utc::now(),
        });
        let chain = find_chain("BTC", &p);
        assert_eq!(chain.len(), 1);
        assert!(chain[0].asset_id.is_none());
        assert_eq!(chain[0].proceeds_ticker, "ETH");
    }
}
