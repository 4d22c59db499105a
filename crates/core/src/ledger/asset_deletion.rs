//! Deleting a whole position.

use std::collections::BTreeMap;

use super::chain_tracker::ChainLink;
use super::ledger_model::{
    ClosedPositionSelector, DeletionPlan, DeletionTarget, LedgerEffect, LedgerOutcome,
    LedgerWarning, ValidationFailure, ValidationResult, WarningKind,
};
use super::reversal_engine::{
    find_partner, not_found, plan_funding_reversal, quantity_without_all, remove_asset_effect,
    remove_transaction_effect, resolve_plan, PlanBuilder,
};
use super::validation::{
    chain_blocked, check_downstream_chain, check_lot_unconsumed, check_not_transfer_copy,
    live_outgoing_transfers, ChainCheck,
};
use crate::assets::{is_quantity_significant, Asset};
use crate::portfolio::{LedgerState, Portfolio};
use crate::settings::LedgerSettings;
use crate::transactions::{Transaction, TransactionType};

/// Computes what deleting an asset would do, without doing it.
///
/// Rejected when a swap chain of two or more hops hangs off the asset, when it
/// holds lots still owned by a live transfer, or when lots it sent by TRANSFER
/// still sit in another portfolio. Direct sales whose proceeds are still held
/// and purchases funded by another asset are reversed along with it.
pub fn plan_asset_deletion(
    state: &LedgerState,
    portfolio_id: &str,
    asset_id: &str,
    settings: &LedgerSettings,
) -> DeletionPlan {
    let target = DeletionTarget::Asset {
        portfolio_id: portfolio_id.to_string(),
        asset_id: asset_id.to_string(),
    };
    let Some(portfolio) = state.find_portfolio(portfolio_id) else {
        return DeletionPlan::rejected(target, not_found("Portfolio", portfolio_id));
    };
    let Some(asset) = portfolio.find_asset(asset_id) else {
        return DeletionPlan::rejected(target, not_found("Asset", asset_id));
    };

    if let Some(redirect) = asset
        .transactions
        .iter()
        .map(|tx| check_not_transfer_copy(state, tx))
        .find(|check| !check.valid)
    {
        return DeletionPlan::rejected(target, redirect);
    }
    let live = live_outgoing_transfers(state, portfolio, Some(asset));
    if !live.is_empty() {
        return DeletionPlan::rejected(
            target,
            ValidationResult::fail(
                ValidationFailure::DanglingReference {
                    reference: live.join(","),
                },
                format!(
                    "{} was transferred to another portfolio {} time(s). Delete those transfers first.",
                    asset.ticker,
                    live.len()
                ),
            ),
        );
    }

    let mut plan = PlanBuilder::new(target);
    match check_downstream_chain(portfolio, &asset.ticker) {
        ChainCheck::Blocked(chain) => {
            plan.reject(chain_blocked(&asset.ticker, chain));
            return plan.finish();
        }
        ChainCheck::SingleHop(links) => plan_proceeds_reversal(portfolio, asset, &links, &mut plan),
        ChainCheck::Clear => {}
    }
    if plan.is_rejected() {
        return plan.finish();
    }

    for buy in asset.transactions.iter().filter(|tx| is_funded_purchase(tx)) {
        plan_funding_reversal(portfolio, asset, buy, settings, &mut plan);
    }

    plan.effect(remove_asset_effect(portfolio, asset));
    let count = portfolio
        .closed_positions
        .iter()
        .filter(|cp| cp.ticker.eq_ignore_ascii_case(&asset.ticker))
        .count();
    if count > 0 {
        plan.effect(LedgerEffect::PurgeClosedPositions {
            portfolio_id: portfolio.id.clone(),
            selector: ClosedPositionSelector::Ticker(asset.ticker.clone()),
            count,
        });
    }
    let cascades = plan.effects().iter().any(|effect| match effect {
        LedgerEffect::RemoveAsset { asset_id, .. } => asset_id != &asset.id,
        LedgerEffect::PurgeClosedPositions {
            selector: ClosedPositionSelector::Ticker(_),
            ..
        } => false,
        _ => true,
    });
    if cascades {
        plan.confirm();
    }
    plan.finish()
}

fn is_funded_purchase(tx: &Transaction) -> bool {
    tx.transaction_type == TransactionType::Buy && (tx.is_linked() || tx.source_ticker.is_some())
}

/// One-hop sales out of `asset`: the proceeds they bought go too.
fn plan_proceeds_reversal(
    portfolio: &Portfolio,
    asset: &Asset,
    links: &[ChainLink],
    plan: &mut PlanBuilder,
) {
    let mut removals: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for link in links {
        let partner = match &link.transaction {
            Some(sell) => find_partner(portfolio, sell),
            None => find_buy_for_sell(portfolio, &link.sell_transaction_id),
        };
        match partner {
            Some((proceeds_asset, buy)) if proceeds_asset.id != asset.id => {
                removals
                    .entry(proceeds_asset.id.as_str())
                    .or_default()
                    .push(buy.id.as_str());
                plan.effect(remove_transaction_effect(portfolio, proceeds_asset, buy));
            }
            Some(_) => {}
            None => match portfolio.find_asset_by_ticker(&link.proceeds_ticker) {
                Some(proceeds_asset) if link.transaction.as_ref().is_some_and(|s| !s.is_linked()) => {
                    plan.effect(remove_asset_effect(portfolio, proceeds_asset));
                }
                _ => plan.warn(
                    LedgerWarning::new(
                        WarningKind::ProceedsMissing,
                        format!(
                            "The {} received for {} is no longer held; that sale cannot be unwound",
                            link.proceeds_ticker,
                            link.describe()
                        ),
                    )
                    .in_portfolio(&portfolio.id)
                    .for_ticker(&link.proceeds_ticker),
                ),
            },
        }
    }

    for (proceeds_asset_id, ids) in removals {
        let Some(proceeds_asset) = portfolio.find_asset(proceeds_asset_id) else {
            continue;
        };
        for buy in ids.iter().filter_map(|id| proceeds_asset.find_transaction(id)) {
            let lot_check = check_lot_unconsumed(portfolio, proceeds_asset, buy, &asset.ticker);
            if !lot_check.valid {
                plan.reject(lot_check);
                return;
            }
        }
        let remaining = quantity_without_all(proceeds_asset, &ids);
        if remaining.is_sign_negative() && is_quantity_significant(&remaining) {
            plan.reject(ValidationResult::fail(
                ValidationFailure::ProceedsConsumed {
                    ticker: proceeds_asset.ticker.clone(),
                },
                format!(
                    "The {} bought with {} was already spent. Reverse those disposals first.",
                    proceeds_asset.ticker, asset.ticker
                ),
            ));
            return;
        }
        if !is_quantity_significant(&remaining) {
            plan.effect(remove_asset_effect(portfolio, proceeds_asset));
        }
    }
    plan.confirm();
}

fn find_buy_for_sell<'a>(portfolio: &'a Portfolio, sell_id: &str) -> Option<(&'a Asset, &'a Transaction)> {
    portfolio.assets.iter().find_map(|asset| {
        asset
            .transactions
            .iter()
            .find(|tx| {
                tx.transaction_type == TransactionType::Buy
                    && tx.linked_buy_sell_transaction_id.as_deref() == Some(sell_id)
            })
            .map(|tx| (asset, tx))
    })
}

/// Deletes a whole asset, cascading as planned.
pub fn delete_asset(
    state: &LedgerState,
    portfolio_id: &str,
    asset_id: &str,
    confirmed: bool,
    settings: &LedgerSettings,
) -> LedgerOutcome {
    let exists = state
        .find_portfolio(portfolio_id)
        .and_then(|p| p.find_asset(asset_id))
        .is_some();
    if !exists {
        return LedgerOutcome::no_op(format!("Asset {} not found in portfolio {}", asset_id, portfolio_id));
    }
    let plan = plan_asset_deletion(state, portfolio_id, asset_id, settings);
    resolve_plan(state, plan, confirmed)
}
