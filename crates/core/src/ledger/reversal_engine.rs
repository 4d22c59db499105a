//! Deletion of single transactions: plan first, then execute.
//!
//! The planner inspects the state and returns a [`DeletionPlan`] listing every
//! effect the deletion cascades into. The executor replays those effects on a
//! copy of the state. Callers that pass `confirmed = false` receive the plan
//! back whenever it reaches beyond the targeted transaction.

use log::{debug, info, warn};
use rust_decimal::Decimal;

use super::apply_engine::{applied, remove_depleted};
use super::chain_tracker::{direct_sales, find_chain};
use super::ledger_model::{
    ClosedPositionSelector, DeletionPlan, DeletionTarget, LedgerEffect, LedgerOutcome,
    LedgerWarning, RestoredLot, ValidationFailure, ValidationResult, WarningKind,
};
use super::validation::{
    chain_blocked, check_destination_holds, check_lot_unconsumed, check_not_transfer_copy,
    check_removal_keeps_balance, live_outgoing_transfers, most_recent_first, proceeds_consumed,
};
use crate::assets::{base_symbol, is_cash_like, is_quantity_significant, recompute, same_symbol, Asset};
use crate::constants::{RESTORATION_DEPOSIT_SOURCE, RESTORATION_TAG};
use crate::fx::convert_or_passthrough;
use crate::portfolio::{LedgerState, Portfolio};
use crate::settings::LedgerSettings;
use crate::transactions::{Transaction, TransactionType};

/// Accumulates a plan while the planner walks the cases.
pub(super) struct PlanBuilder {
    target: DeletionTarget,
    rejection: Option<ValidationResult>,
    effects: Vec<LedgerEffect>,
    warnings: Vec<LedgerWarning>,
    needs_confirmation: bool,
}

impl PlanBuilder {
    pub(super) fn new(target: DeletionTarget) -> Self {
        PlanBuilder {
            target,
            rejection: None,
            effects: Vec::new(),
            warnings: Vec::new(),
            needs_confirmation: false,
        }
    }

    pub(super) fn reject(&mut self, validation: ValidationResult) {
        if self.rejection.is_none() {
            self.rejection = Some(validation);
        }
    }

    pub(super) fn is_rejected(&self) -> bool {
        self.rejection.is_some()
    }

    pub(super) fn effect(&mut self, effect: LedgerEffect) {
        if !self.effects.contains(&effect) {
            self.effects.push(effect);
        }
    }

    pub(super) fn warn(&mut self, warning: LedgerWarning) {
        self.warnings.push(warning);
    }

    pub(super) fn confirm(&mut self) {
        self.needs_confirmation = true;
    }

    pub(super) fn effects(&self) -> &[LedgerEffect] {
        &self.effects
    }

    pub(super) fn finish(self) -> DeletionPlan {
        if let Some(validation) = self.rejection {
            return DeletionPlan::rejected(self.target, validation);
        }
        DeletionPlan {
            target: self.target,
            validation: ValidationResult::ok(),
            requires_confirmation: self.needs_confirmation || !self.warnings.is_empty(),
            effects: self.effects,
            warnings: self.warnings,
        }
    }
}

pub(super) fn not_found(what: &str, id: &str) -> ValidationResult {
    ValidationResult::fail(ValidationFailure::InvalidTarget, format!("{} {} not found", what, id))
}

pub(super) fn remove_transaction_effect(portfolio: &Portfolio, asset: &Asset, tx: &Transaction) -> LedgerEffect {
    LedgerEffect::RemoveTransaction {
        portfolio_id: portfolio.id.clone(),
        ticker: asset.ticker.clone(),
        transaction_id: tx.id.clone(),
        transaction_type: tx.transaction_type,
        quantity: tx.quantity,
        date: tx.date,
    }
}

pub(super) fn remove_asset_effect(portfolio: &Portfolio, asset: &Asset) -> LedgerEffect {
    LedgerEffect::RemoveAsset {
        portfolio_id: portfolio.id.clone(),
        asset_id: asset.id.clone(),
        ticker: asset.ticker.clone(),
    }
}

/// Quantity `asset` would hold without the listed transactions.
pub(super) fn quantity_without_all(asset: &Asset, transaction_ids: &[&str]) -> Decimal {
    let remaining: Vec<Transaction> = asset
        .transactions
        .iter()
        .filter(|tx| !transaction_ids.contains(&tx.id.as_str()))
        .cloned()
        .collect();
    recompute(&remaining).quantity
}

pub(super) fn purge_closed_by_sell(portfolio: &Portfolio, sell_id: &str, plan: &mut PlanBuilder) {
    let count = portfolio.closed_positions_for_sell(sell_id).len();
    if count > 0 {
        plan.effect(LedgerEffect::PurgeClosedPositions {
            portfolio_id: portfolio.id.clone(),
            selector: ClosedPositionSelector::SellTransaction(sell_id.to_string()),
            count,
        });
        plan.confirm();
    }
}

/// Finds the other half of a swap pair anywhere in the portfolio.
pub(super) fn find_partner<'a>(portfolio: &'a Portfolio, tx: &Transaction) -> Option<(&'a Asset, &'a Transaction)> {
    if let Some(found) = tx
        .linked_buy_sell_transaction_id
        .as_deref()
        .and_then(|id| portfolio.find_transaction(id))
    {
        return Some(found);
    }
    let pair_id = tx.transaction_pair_id.as_deref()?;
    portfolio.assets.iter().find_map(|asset| {
        asset
            .transactions
            .iter()
            .find(|other| other.id != tx.id && other.transaction_pair_id.as_deref() == Some(pair_id))
            .map(|other| (asset, other))
    })
}

/// Unlinked SELL that most likely paid for a legacy BUY with `source_ticker` set.
pub(super) fn find_legacy_sale<'a>(portfolio: &'a Portfolio, buy: &Transaction, buy_ticker: &str) -> Option<(&'a Asset, &'a Transaction)> {
    let source_ticker = buy.source_ticker.as_deref()?;
    find_unlinked_sale(portfolio, buy, buy_ticker, |asset, sell| {
        asset.matches_symbol(source_ticker) && sell.destination_quantity.map_or(true, |q| q == buy.quantity)
    })
}

/// Unlinked SELL of another asset whose proceeds are exactly `acquisition`:
/// paid in `ticker`, on the same day, for the same quantity.
pub(super) fn find_paying_sale<'a>(
    portfolio: &'a Portfolio,
    acquisition: &Transaction,
    ticker: &str,
) -> Option<(&'a Asset, &'a Transaction)> {
    find_unlinked_sale(portfolio, acquisition, ticker, |asset, sell| {
        !asset.matches_symbol(ticker) && sell.destination_quantity == Some(acquisition.quantity)
    })
}

fn find_unlinked_sale<'a>(
    portfolio: &'a Portfolio,
    acquisition: &Transaction,
    ticker: &str,
    accept: impl Fn(&Asset, &Transaction) -> bool,
) -> Option<(&'a Asset, &'a Transaction)> {
    portfolio.assets.iter().find_map(|asset| {
        asset
            .transactions
            .iter()
            .find(|tx| {
                tx.transaction_type == TransactionType::Sell
                    && !tx.is_linked()
                    && tx.date == acquisition.date
                    && tx.proceeds_ticker().is_some_and(|p| same_symbol(p, ticker))
                    && accept(asset, tx)
            })
            .map(|tx| (asset, tx))
    })
}

/// Gives back what a purchase spent when its SELL no longer exists.
///
/// Closed positions recorded by the sale restore the exact lots it consumed.
/// Without them (the source was cash) a single restoration deposit stands in.
pub(super) fn plan_spent_source_restoration(
    portfolio: &Portfolio,
    sell_id: Option<&str>,
    buy: &Transaction,
    settings: &LedgerSettings,
    plan: &mut PlanBuilder,
) {
    let closed = sell_id
        .map(|id| portfolio.closed_positions_for_sell(id))
        .unwrap_or_default();
    if let (Some(first), Some(sell_id)) = (closed.first(), sell_id) {
        plan.effect(LedgerEffect::RestoreLots {
            portfolio_id: portfolio.id.clone(),
            ticker: first.ticker.clone(),
            sell_transaction_id: sell_id.to_string(),
            lots: closed.iter().map(|cp| RestoredLot::from(*cp)).collect(),
        });
        plan.confirm();
        return;
    }

    match (buy.source_ticker.as_deref(), buy.source_quantity) {
        (Some(source_ticker), Some(quantity)) if quantity > Decimal::ZERO => {
            let existing = portfolio.find_asset_by_ticker(source_ticker);
            let currency = match existing {
                Some(asset) => asset.currency.clone(),
                None if is_cash_like(source_ticker) && base_symbol(source_ticker).len() == 3 => {
                    base_symbol(source_ticker)
                }
                None => buy.purchase_currency.clone(),
            };
            let total_cost = convert_or_passthrough(
                buy.total_cost,
                &buy.purchase_currency,
                &currency,
                buy.exchange_rate_at_purchase.as_ref(),
                &settings.fallback_rates,
            );
            plan.effect(LedgerEffect::RestoreSpentSource {
                portfolio_id: portfolio.id.clone(),
                ticker: existing
                    .map(|a| a.ticker.clone())
                    .unwrap_or_else(|| source_ticker.trim().to_uppercase()),
                quantity,
                total_cost,
                currency,
                date: buy.date,
            });
            plan.confirm();
        }
        _ => {
            plan.warn(
                LedgerWarning::new(
                    WarningKind::SourceMissing,
                    "The asset spent on this purchase is gone and cannot be restored",
                )
                .in_portfolio(&portfolio.id),
            );
        }
    }
}

/// Computes what deleting one transaction would do, without doing it.
pub fn plan_transaction_deletion(
    state: &LedgerState,
    portfolio_id: &str,
    asset_id: &str,
    transaction_id: &str,
    settings: &LedgerSettings,
) -> DeletionPlan {
    let target = DeletionTarget::Transaction {
        portfolio_id: portfolio_id.to_string(),
        asset_id: asset_id.to_string(),
        transaction_id: transaction_id.to_string(),
    };
    let Some(portfolio) = state.find_portfolio(portfolio_id) else {
        return DeletionPlan::rejected(target, not_found("Portfolio", portfolio_id));
    };
    let Some(asset) = portfolio.find_asset(asset_id) else {
        return DeletionPlan::rejected(target, not_found("Asset", asset_id));
    };
    let Some(tx) = asset.find_transaction(transaction_id) else {
        return DeletionPlan::rejected(target, not_found("Transaction", transaction_id));
    };
    let copy_check = check_not_transfer_copy(state, tx);
    if !copy_check.valid {
        return DeletionPlan::rejected(target, copy_check);
    }

    let mut plan = PlanBuilder::new(target);
    if tx.is_transfer_copy() {
        plan_orphaned_copies(state, portfolio, asset, tx, &mut plan);
        return plan.finish();
    }

    match tx.transaction_type {
        TransactionType::Transfer => plan_transfer(state, portfolio, asset, tx, &mut plan),
        TransactionType::Sell if tx.is_linked() => plan_linked_pair(portfolio, asset, tx, settings, &mut plan),
        TransactionType::Sell => plan_unlinked_sell(state, portfolio, asset, tx, &mut plan),
        TransactionType::Buy if tx.is_linked() => plan_linked_pair(portfolio, asset, tx, settings, &mut plan),
        TransactionType::Buy if tx.source_ticker.is_some() => {
            plan_legacy_buy(portfolio, asset, tx, settings, &mut plan)
        }
        TransactionType::Withdrawal => plan.effect(remove_transaction_effect(portfolio, asset, tx)),
        TransactionType::Buy | TransactionType::Deposit | TransactionType::Income => {
            plan_acquisition(portfolio, asset, tx, &mut plan)
        }
    }
    plan.finish()
}

fn plan_acquisition(portfolio: &Portfolio, asset: &Asset, tx: &Transaction, plan: &mut PlanBuilder) {
    if let Some((sell_asset, sell)) = find_paying_sale(portfolio, tx, &asset.ticker) {
        plan_sale_proceeds(portfolio, asset, tx, sell_asset, sell, plan);
        return;
    }
    let balance = check_removal_keeps_balance(asset, &tx.id);
    if !balance.valid {
        plan.reject(balance);
        return;
    }
    let consumed_by = portfolio
        .closed_positions
        .iter()
        .filter(|cp| cp.buy_transaction_id == tx.id)
        .count();
    if consumed_by > 0 {
        plan.warn(
            LedgerWarning::new(
                WarningKind::LotReferencedByClosedPositions,
                format!(
                    "{} closed position(s) were realized against this lot and will keep referring to it",
                    consumed_by
                ),
            )
            .in_portfolio(&portfolio.id)
            .for_ticker(&asset.ticker),
        );
    }
    plan.effect(remove_transaction_effect(portfolio, asset, tx));
    if !is_quantity_significant(&asset.quantity_without(&tx.id)) {
        plan.effect(remove_asset_effect(portfolio, asset));
    }
}

/// Acquisition recorded as the proceeds of an unlinked SELL. It goes together
/// with the sale, and only while it is the position's only transaction.
fn plan_sale_proceeds(
    portfolio: &Portfolio,
    asset: &Asset,
    tx: &Transaction,
    sell_asset: &Asset,
    sell: &Transaction,
    plan: &mut PlanBuilder,
) {
    if asset.transactions.len() > 1 {
        plan.reject(ValidationResult::fail(
            ValidationFailure::PositionHasOtherTransactions {
                ticker: asset.ticker.clone(),
            },
            format!(
                "This {} came from selling {}. Delete the whole {} position to reverse it.",
                asset.ticker, sell_asset.ticker, asset.ticker
            ),
        ));
        return;
    }
    debug!(
        "Reversing sale {} of {} together with its {} proceeds",
        sell.id, sell_asset.ticker, asset.ticker
    );
    plan.effect(remove_transaction_effect(portfolio, asset, tx));
    plan.effect(remove_asset_effect(portfolio, asset));
    plan.effect(remove_transaction_effect(portfolio, sell_asset, sell));
    purge_closed_by_sell(portfolio, &sell.id, plan);
    plan.confirm();
}

/// Either side of a swap pair: both halves go, with the sale's closed positions.
fn plan_linked_pair(
    portfolio: &Portfolio,
    asset: &Asset,
    tx: &Transaction,
    settings: &LedgerSettings,
    plan: &mut PlanBuilder,
) {
    let partner = find_partner(portfolio, tx);
    let (sell, buy) = if tx.transaction_type == TransactionType::Sell {
        (Some((asset, tx)), partner)
    } else {
        (partner, Some((asset, tx)))
    };
    let sell_id = match (sell, buy) {
        (Some((_, sell)), _) => Some(sell.id.clone()),
        (None, Some((_, buy))) => buy.linked_buy_sell_transaction_id.clone(),
        (None, None) => None,
    };

    match buy {
        Some((buy_asset, buy)) => {
            let balance = check_removal_keeps_balance(buy_asset, &buy.id);
            if !balance.valid {
                let chain = most_recent_first(find_chain(&buy_asset.ticker, portfolio));
                plan.reject(proceeds_consumed(&buy_asset.ticker, chain));
                return;
            }
            let chain_ticker = sell.map_or(buy_asset.ticker.as_str(), |(sell_asset, _)| sell_asset.ticker.as_str());
            let lot = check_lot_unconsumed(portfolio, buy_asset, buy, chain_ticker);
            if !lot.valid {
                plan.reject(lot);
                return;
            }
            plan.effect(remove_transaction_effect(portfolio, buy_asset, buy));
            if !is_quantity_significant(&buy_asset.quantity_without(&buy.id)) {
                plan.effect(remove_asset_effect(portfolio, buy_asset));
            }
        }
        None => {
            let proceeds = tx.proceeds_ticker().unwrap_or("proceeds").to_string();
            plan.warn(
                LedgerWarning::new(
                    WarningKind::ProceedsMissing,
                    format!(
                        "The {} received from this sale is no longer held; only the sale is reversed",
                        proceeds
                    ),
                )
                .in_portfolio(&portfolio.id)
                .for_ticker(&proceeds),
            );
        }
    }

    match (sell, buy) {
        (Some((sell_asset, sell)), _) => plan.effect(remove_transaction_effect(portfolio, sell_asset, sell)),
        (None, Some((_, buy))) => plan_spent_source_restoration(portfolio, sell_id.as_deref(), buy, settings, plan),
        (None, None) => {}
    }
    if let Some(sell_id) = sell_id.as_deref() {
        purge_closed_by_sell(portfolio, sell_id, plan);
    }
    plan.confirm();
}

/// SELL recorded without a partner BUY: the proceeds position is reversed whole.
fn plan_unlinked_sell(
    state: &LedgerState,
    portfolio: &Portfolio,
    asset: &Asset,
    tx: &Transaction,
    plan: &mut PlanBuilder,
) {
    plan.effect(remove_transaction_effect(portfolio, asset, tx));
    purge_closed_by_sell(portfolio, &tx.id, plan);

    let Some(proceeds_ticker) = tx.proceeds_ticker().filter(|p| !same_symbol(p, &asset.ticker)) else {
        return;
    };
    match portfolio.find_asset_by_ticker(proceeds_ticker) {
        Some(proceeds_asset) => {
            if !direct_sales(&proceeds_asset.ticker, portfolio).is_empty() {
                let chain = most_recent_first(find_chain(&proceeds_asset.ticker, portfolio));
                plan.reject(chain_blocked(&proceeds_asset.ticker, chain));
                return;
            }
            if !live_outgoing_transfers(state, portfolio, Some(proceeds_asset)).is_empty() {
                plan.reject(ValidationResult::fail(
                    ValidationFailure::DanglingReference {
                        reference: proceeds_asset.id.clone(),
                    },
                    format!(
                        "Part of the {} received was transferred to another portfolio; reverse that transfer first",
                        proceeds_asset.ticker
                    ),
                ));
                return;
            }
            plan.effect(remove_asset_effect(portfolio, proceeds_asset));
            let count = portfolio
                .closed_positions
                .iter()
                .filter(|cp| cp.ticker.eq_ignore_ascii_case(&proceeds_asset.ticker))
                .count();
            if count > 0 {
                plan.effect(LedgerEffect::PurgeClosedPositions {
                    portfolio_id: portfolio.id.clone(),
                    selector: ClosedPositionSelector::Ticker(proceeds_asset.ticker.clone()),
                    count,
                });
            }
            plan.confirm();
        }
        None => {
            plan.warn(
                LedgerWarning::new(
                    WarningKind::ProceedsMissing,
                    format!(
                        "{} received from this sale was already removed; reversal cannot restore it",
                        proceeds_ticker
                    ),
                )
                .in_portfolio(&portfolio.id)
                .for_ticker(proceeds_ticker),
            );
        }
    }
}

/// BUY that names a source asset but has no partner link.
fn plan_legacy_buy(
    portfolio: &Portfolio,
    asset: &Asset,
    tx: &Transaction,
    settings: &LedgerSettings,
    plan: &mut PlanBuilder,
) {
    if asset.transactions.len() > 1 {
        plan.reject(ValidationResult::fail(
            ValidationFailure::PositionHasOtherTransactions {
                ticker: asset.ticker.clone(),
            },
            format!(
                "This purchase was paid with {}. Delete the whole {} position to reverse it.",
                tx.source_ticker.as_deref().unwrap_or("another asset"),
                asset.ticker
            ),
        ));
        return;
    }
    let lot = check_lot_unconsumed(portfolio, asset, tx, &asset.ticker);
    if !lot.valid {
        plan.reject(lot);
        return;
    }
    plan.effect(remove_transaction_effect(portfolio, asset, tx));
    plan.effect(remove_asset_effect(portfolio, asset));
    plan_funding_reversal(portfolio, asset, tx, settings, plan);
}

/// Reverses whatever paid for `buy`: removes its SELL, or restores the spent source.
pub(super) fn plan_funding_reversal(
    portfolio: &Portfolio,
    asset: &Asset,
    buy: &Transaction,
    settings: &LedgerSettings,
    plan: &mut PlanBuilder,
) {
    let sale = if buy.is_linked() {
        find_partner(portfolio, buy)
    } else {
        find_legacy_sale(portfolio, buy, &asset.ticker)
    };
    match sale {
        Some((sell_asset, sell)) if sell_asset.id != asset.id => {
            plan.effect(remove_transaction_effect(portfolio, sell_asset, sell));
            purge_closed_by_sell(portfolio, &sell.id, plan);
        }
        Some(_) => {}
        None => {
            let sell_id = buy.linked_buy_sell_transaction_id.as_deref();
            plan_spent_source_restoration(portfolio, sell_id, buy, settings, plan);
            if let Some(sell_id) = sell_id {
                purge_closed_by_sell(portfolio, sell_id, plan);
            }
        }
    }
    plan.confirm();
}

/// TRANSFER in the source portfolio: its lot copies leave the destination.
fn plan_transfer(
    state: &LedgerState,
    portfolio: &Portfolio,
    asset: &Asset,
    tx: &Transaction,
    plan: &mut PlanBuilder,
) {
    plan.effect(remove_transaction_effect(portfolio, asset, tx));
    let destination = tx
        .destination_portfolio_id
        .as_deref()
        .and_then(|id| state.find_portfolio(id));
    let Some(destination) = destination else {
        plan.warn(
            LedgerWarning::new(
                WarningKind::DanglingTransferCopy,
                "The destination portfolio no longer exists; only the transfer record is removed",
            )
            .in_portfolio(&portfolio.id)
            .for_ticker(&asset.ticker),
        );
        return;
    };

    let holds = check_destination_holds(destination, &asset.ticker, tx.quantity);
    if !holds.valid {
        plan.reject(holds);
        return;
    }
    plan.effect(LedgerEffect::RemoveTransferredLots {
        portfolio_id: destination.id.clone(),
        ticker: asset.ticker.clone(),
        quantity: tx.quantity,
        transfer_transaction_id: tx.id.clone(),
        source_portfolio_id: portfolio.id.clone(),
    });
    if let Some(dest_asset) = destination.find_asset_by_ticker(&asset.ticker) {
        if !is_quantity_significant(&(dest_asset.quantity - tx.quantity)) {
            plan.effect(remove_asset_effect(destination, dest_asset));
        }
        let copy_ids: Vec<&str> = dest_asset
            .transactions
            .iter()
            .filter(|c| c.transfer_transaction_id.as_deref() == Some(tx.id.as_str()))
            .map(|c| c.id.as_str())
            .collect();
        if destination
            .closed_positions
            .iter()
            .any(|cp| copy_ids.contains(&cp.buy_transaction_id.as_str()))
        {
            plan.warn(
                LedgerWarning::new(
                    WarningKind::LotReferencedByClosedPositions,
                    format!(
                        "Portfolio '{}' realized gains against the transferred lots; those records keep referring to them",
                        destination.name
                    ),
                )
                .in_portfolio(&destination.id)
                .for_ticker(&asset.ticker),
            );
        }
    }
    plan.confirm();
}

/// Transfer copies whose TRANSFER is gone: rebuild the source from them.
fn plan_orphaned_copies(
    state: &LedgerState,
    portfolio: &Portfolio,
    asset: &Asset,
    tx: &Transaction,
    plan: &mut PlanBuilder,
) {
    let copies: Vec<&Transaction> = asset
        .transactions
        .iter()
        .filter(|c| c.is_transfer_copy())
        .filter(|c| c.transferred_from == tx.transferred_from)
        .filter(|c| c.transfer_transaction_id == tx.transfer_transaction_id)
        .collect();
    let quantity: Decimal = copies.iter().map(|c| c.quantity).sum();
    let ids: Vec<&str> = copies.iter().map(|c| c.id.as_str()).collect();
    let remaining = quantity_without_all(asset, &ids);
    if remaining.is_sign_negative() && is_quantity_significant(&remaining) {
        plan.reject(ValidationResult::fail(
            ValidationFailure::DestinationShortfall {
                ticker: asset.ticker.clone(),
                required: quantity,
                available: asset.quantity,
            },
            format!(
                "The transferred {} was already partly disposed of here; reverse that first",
                asset.ticker
            ),
        ));
        return;
    }

    let source_id = tx.transferred_from.clone().unwrap_or_default();
    plan.warn(
        LedgerWarning::new(
            WarningKind::OrphanedTransfer,
            "The transfer that produced these lots no longer exists in its source portfolio",
        )
        .in_portfolio(&portfolio.id)
        .for_ticker(&asset.ticker),
    );
    plan.effect(LedgerEffect::RemoveTransferredLots {
        portfolio_id: portfolio.id.clone(),
        ticker: asset.ticker.clone(),
        quantity,
        transfer_transaction_id: tx.transfer_transaction_id.clone().unwrap_or_default(),
        source_portfolio_id: source_id.clone(),
    });
    if !is_quantity_significant(&remaining) {
        plan.effect(remove_asset_effect(portfolio, asset));
    }
    match state.find_portfolio(&source_id) {
        Some(source) => plan.effect(LedgerEffect::ReconstructSourceAsset {
            portfolio_id: source.id.clone(),
            ticker: asset.ticker.clone(),
            name: asset.name.clone(),
            currency: asset.currency.clone(),
            lots: copies.iter().map(|c| (*c).clone().without_linkage()).collect(),
        }),
        None => plan.warn(
            LedgerWarning::new(
                WarningKind::DanglingTransferCopy,
                "The source portfolio no longer exists; the lots are removed without being rebuilt",
            )
            .in_portfolio(&portfolio.id)
            .for_ticker(&asset.ticker),
        ),
    }
    plan.confirm();
}

/// Deletes one transaction, cascading as planned.
pub fn delete_transaction(
    state: &LedgerState,
    portfolio_id: &str,
    asset_id: &str,
    transaction_id: &str,
    confirmed: bool,
    settings: &LedgerSettings,
) -> LedgerOutcome {
    let exists = state
        .find_portfolio(portfolio_id)
        .and_then(|p| p.find_asset(asset_id))
        .and_then(|a| a.find_transaction(transaction_id))
        .is_some();
    if !exists {
        return LedgerOutcome::no_op(format!(
            "Transaction {} not found on asset {}",
            transaction_id, asset_id
        ));
    }
    let plan = plan_transaction_deletion(state, portfolio_id, asset_id, transaction_id, settings);
    resolve_plan(state, plan, confirmed)
}

/// Turns a plan into an outcome: rejection, a confirmation request, or the new state.
pub fn resolve_plan(state: &LedgerState, plan: DeletionPlan, confirmed: bool) -> LedgerOutcome {
    if !plan.validation.valid {
        debug!("Deletion rejected: {:?}", plan.validation.error);
        return LedgerOutcome::Rejected(plan.validation);
    }
    if plan.requires_confirmation && !confirmed {
        return LedgerOutcome::NeedsConfirmation(plan);
    }
    execute_plan(state, plan)
}

/// Applies every effect of a validated plan to a copy of `state`.
pub fn execute_plan(state: &LedgerState, plan: DeletionPlan) -> LedgerOutcome {
    let mut next = state.clone();
    for effect in &plan.effects {
        execute_effect(&mut next, effect);
    }

    let mut effects = plan.effects;
    let mut removed = Vec::new();
    remove_depleted(state, &mut next, &mut removed);
    for effect in removed {
        let already_listed = effects.iter().any(|e| match (e, &effect) {
            (
                LedgerEffect::RemoveAsset { asset_id: a, .. },
                LedgerEffect::RemoveAsset { asset_id: b, .. },
            ) => a == b,
            _ => false,
        });
        if !already_listed {
            effects.push(effect);
        }
    }

    for warning in &plan.warnings {
        warn!("Deletion proceeded past warning: {}", warning);
    }
    info!("Deletion applied with {} effect(s)", effects.len());
    applied(next, effects, plan.warnings)
}

fn execute_effect(state: &mut LedgerState, effect: &LedgerEffect) {
    let sequence = state.next_sequence();
    match effect {
        LedgerEffect::RemoveTransaction {
            portfolio_id,
            transaction_id,
            ..
        } => {
            let removed = state
                .find_portfolio_mut(portfolio_id)
                .and_then(|p| {
                    p.assets
                        .iter_mut()
                        .find_map(|a| a.remove_transaction(transaction_id))
                });
            if removed.is_none() {
                debug!("Transaction {} already gone", transaction_id);
            }
        }
        LedgerEffect::RemoveAsset {
            portfolio_id,
            asset_id,
            ..
        } => {
            if let Some(portfolio) = state.find_portfolio_mut(portfolio_id) {
                portfolio.assets.retain(|a| &a.id != asset_id);
            }
        }
        LedgerEffect::PurgeClosedPositions {
            portfolio_id,
            selector,
            ..
        } => {
            if let Some(portfolio) = state.find_portfolio_mut(portfolio_id) {
                portfolio.closed_positions.retain(|cp| !selector.matches(cp));
            }
        }
        LedgerEffect::RestoreLots {
            portfolio_id,
            ticker,
            lots,
            ..
        } => {
            let Some(portfolio) = state.find_portfolio_mut(portfolio_id) else {
                return;
            };
            let currency = lots.first().map(|l| l.currency.clone()).unwrap_or_default();
            let asset = portfolio.asset_for_ticker_mut(ticker, None, &currency);
            for lot in lots {
                restore_lot(asset, lot);
            }
            asset.recalculate_aggregates();
        }
        LedgerEffect::RestoreSpentSource {
            portfolio_id,
            ticker,
            quantity,
            total_cost,
            currency,
            date,
        } => {
            let Some(portfolio) = state.find_portfolio_mut(portfolio_id) else {
                return;
            };
            let price = if quantity.is_zero() {
                Decimal::ZERO
            } else {
                *total_cost / *quantity
            };
            let mut deposit = Transaction::new(
                TransactionType::Deposit,
                *quantity,
                price,
                *date,
                currency,
                RESTORATION_TAG,
                sequence,
            );
            deposit.deposit_source = Some(RESTORATION_DEPOSIT_SOURCE.to_string());
            portfolio
                .asset_for_ticker_mut(ticker, None, currency)
                .push_transaction(deposit);
        }
        LedgerEffect::RemoveTransferredLots {
            portfolio_id,
            ticker,
            quantity,
            transfer_transaction_id,
            source_portfolio_id,
        } => {
            let Some(asset) = state
                .find_portfolio_mut(portfolio_id)
                .and_then(|p| p.find_asset_by_ticker_mut(ticker))
            else {
                return;
            };
            let unmatched = remove_transferred_lots(asset, *quantity, transfer_transaction_id, source_portfolio_id);
            if is_quantity_significant(&unmatched) {
                warn!(
                    "Could not find {} {} to remove from portfolio {}",
                    unmatched, ticker, portfolio_id
                );
            }
        }
        LedgerEffect::ReconstructSourceAsset {
            portfolio_id,
            ticker,
            name,
            currency,
            lots,
        } => {
            let Some(portfolio) = state.find_portfolio_mut(portfolio_id) else {
                return;
            };
            let asset = portfolio.asset_for_ticker_mut(ticker, Some(name), currency);
            asset.transactions.extend(lots.iter().cloned());
            asset.recalculate_aggregates();
        }
        LedgerEffect::CreateAsset { .. }
        | LedgerEffect::CreateTransaction { .. }
        | LedgerEffect::CreateClosedPositions { .. } => {}
    }
}

/// Adds a closed position's slice back into its lot, recreating the lot under
/// its original id when it no longer exists.
fn restore_lot(asset: &mut Asset, lot: &RestoredLot) {
    if let Some(existing) = asset.find_transaction_mut(&lot.buy_transaction_id) {
        existing.quantity += lot.quantity;
        existing.total_cost += lot.cost_basis;
        return;
    }
    asset.transactions.push(Transaction {
        id: lot.buy_transaction_id.clone(),
        transaction_type: lot.transaction_type,
        quantity: lot.quantity,
        price_per_coin: lot.price_per_coin,
        date: lot.date,
        total_cost: lot.cost_basis,
        tag: lot.tag.clone(),
        created_at: lot.created_at,
        sequence: lot.sequence,
        purchase_currency: lot.currency.clone(),
        exchange_rate_at_purchase: lot.exchange_rates.clone(),
        ..Default::default()
    });
}

/// Takes `quantity` worth of acquisition lots out of a transfer destination.
///
/// Copies made by the named transfer go first, then other copies from the same
/// source portfolio, then any lot; oldest first within each group. A lot that
/// straddles the remainder is split. Returns what could not be removed.
pub fn remove_transferred_lots(
    asset: &mut Asset,
    quantity: Decimal,
    transfer_transaction_id: &str,
    source_portfolio_id: &str,
) -> Decimal {
    let mut order: Vec<(u8, _, usize)> = asset
        .transactions
        .iter()
        .enumerate()
        .filter(|(_, tx)| tx.is_acquisition())
        .map(|(index, tx)| {
            let rank = if !transfer_transaction_id.is_empty()
                && tx.transfer_transaction_id.as_deref() == Some(transfer_transaction_id)
            {
                0
            } else if tx.transferred_from.as_deref() == Some(source_portfolio_id) {
                1
            } else {
                2
            };
            (rank, tx.fifo_key(), index)
        })
        .collect();
    order.sort();

    let mut remaining = quantity;
    let mut dropped = Vec::new();
    for (_, _, index) in order {
        if !is_quantity_significant(&remaining) {
            break;
        }
        let lot = &mut asset.transactions[index];
        if lot.quantity <= remaining {
            remaining -= lot.quantity;
            dropped.push(index);
        } else {
            let keep = lot.quantity - remaining;
            lot.resize_lot(keep);
            remaining = Decimal::ZERO;
        }
    }
    dropped.sort_unstable_by(|a, b| b.cmp(a));
    for index in dropped {
        asset.transactions.remove(index);
    }
    asset.recalculate_aggregates();
    remaining.max(Decimal::ZERO)
}
