use log::warn;
use std::collections::HashSet;

use super::ledger_model::{LedgerWarning, WarningKind};
use crate::assets::{is_quantity_significant, recompute};
use crate::fx::convert_or_passthrough;
use crate::portfolio::{LedgerState, Portfolio, RealizedSummary, TickerRealized};
use crate::settings::LedgerSettings;
use crate::transactions::TransactionType;

/// Checks every stored aggregate and cross-reference and reports what is off.
/// Read-only; nothing is repaired.
pub fn audit(state: &LedgerState) -> Vec<LedgerWarning> {
    let mut warnings = Vec::new();
    for portfolio in &state.portfolios {
        audit_portfolio(state, portfolio, &mut warnings);
    }
    for warning in &warnings {
        warn!("Audit: {}", warning);
    }
    warnings
}

fn audit_portfolio(state: &LedgerState, portfolio: &Portfolio, warnings: &mut Vec<LedgerWarning>) {
    let mut held_tickers: HashSet<String> = HashSet::new();
    let mut transaction_ids: HashSet<&str> = HashSet::new();

    for asset in &portfolio.assets {
        held_tickers.insert(asset.ticker.to_uppercase());
        transaction_ids.extend(asset.transactions.iter().map(|tx| tx.id.as_str()));

        let expected = recompute(&asset.transactions);
        if expected != asset.aggregates() {
            warnings.push(
                LedgerWarning::new(
                    WarningKind::AggregateDrift,
                    format!(
                        "Stored quantity {} / cost {} differ from recomputed {} / {}",
                        asset.quantity, asset.total_cost_basis, expected.quantity, expected.total_cost_basis
                    ),
                )
                .in_portfolio(&portfolio.id)
                .for_ticker(&asset.ticker),
            );
        }
        if !is_quantity_significant(&expected.quantity) {
            warnings.push(
                LedgerWarning::new(WarningKind::ZeroQuantityAsset, "Position nets to zero but is still listed")
                    .in_portfolio(&portfolio.id)
                    .for_ticker(&asset.ticker),
            );
        }

        for tx in &asset.transactions {
            if let Some(partner_id) = tx.linked_buy_sell_transaction_id.as_deref() {
                let partner_ok = portfolio
                    .find_transaction(partner_id)
                    .is_some_and(|(_, partner)| partner.linked_buy_sell_transaction_id.as_deref() == Some(tx.id.as_str()));
                // A sale may outlive its purchase once the proceeds are spent.
                if !partner_ok && tx.transaction_type == TransactionType::Buy {
                    warnings.push(
                        LedgerWarning::new(
                            WarningKind::DanglingPairLink,
                            format!("{} {} points at missing partner {}", tx.transaction_type, tx.id, partner_id),
                        )
                        .in_portfolio(&portfolio.id)
                        .for_ticker(&asset.ticker),
                    );
                }
            }
            if let (Some(source_id), Some(transfer_id)) =
                (tx.transferred_from.as_deref(), tx.transfer_transaction_id.as_deref())
            {
                let live = state
                    .find_portfolio(source_id)
                    .is_some_and(|source| source.find_transaction(transfer_id).is_some());
                if !live {
                    warnings.push(
                        LedgerWarning::new(
                            WarningKind::DanglingTransferCopy,
                            format!("Transferred lot {} has no TRANSFER {} in portfolio {}", tx.id, transfer_id, source_id),
                        )
                        .in_portfolio(&portfolio.id)
                        .for_ticker(&asset.ticker),
                    );
                }
            }
        }
    }

    let mut reported: HashSet<&str> = HashSet::new();
    for cp in &portfolio.closed_positions {
        let sale_known = transaction_ids.contains(cp.sell_transaction_id.as_str());
        let ticker_held = held_tickers.contains(&cp.ticker.to_uppercase());
        if !sale_known && ticker_held && reported.insert(cp.sell_transaction_id.as_str()) {
            warnings.push(
                LedgerWarning::new(
                    WarningKind::OrphanedClosedPositions,
                    format!("Closed positions refer to sale {} which no longer exists", cp.sell_transaction_id),
                )
                .in_portfolio(&portfolio.id)
                .for_ticker(&cp.ticker),
            );
        }
    }
}

/// Realized P&L per ticker, in the display currency.
pub fn realized_summary(portfolio: &Portfolio, settings: &LedgerSettings) -> RealizedSummary {
    let display = settings.display_currency.as_str();
    let mut summary = RealizedSummary {
        portfolio_id: portfolio.id.clone(),
        currency: display.to_string(),
        ..Default::default()
    };

    for cp in &portfolio.closed_positions {
        let to_display = |amount| {
            convert_or_passthrough(amount, &cp.pnl_currency, display, None, &settings.fallback_rates)
        };
        let pnl = to_display(cp.realized_pnl);
        let entry = summary
            .by_ticker
            .entry(cp.ticker.clone())
            .or_insert_with(|| TickerRealized {
                ticker: cp.ticker.clone(),
                ..Default::default()
            });
        entry.positions += 1;
        entry.quantity += cp.exit_quantity;
        entry.cost_basis += to_display(cp.cost_basis_display);
        entry.proceeds += to_display(cp.proceeds_display);
        entry.realized_pnl += pnl;
        summary.total_realized_pnl += pnl;
    }
    summary
}
