use log::info;
use rust_decimal::Decimal;

use super::apply_engine::{applied, remove_depleted};
use super::fifo_resolver::resolve_fifo;
use super::ledger_model::{
    LedgerOutcome, LedgerWarning, ValidationFailure, ValidationResult, WarningKind,
};
use super::validation::{check_available, ensure_not_negative, ensure_positive};
use crate::assets::{is_quantity_significant, recompute};
use crate::errors::{Error, Result};
use crate::portfolio::LedgerState;
use crate::settings::LedgerSettings;
use crate::transactions::{Transaction, TransactionEdit, TransactionType};

/// Edits one transaction in place.
///
/// Tag and notes may change on anything. Quantity, price, total and date may
/// change on plain acquisitions and withdrawals only; swap halves, transfers
/// and transfer copies must be deleted and recorded again.
pub fn edit_transaction(
    state: &LedgerState,
    portfolio_id: &str,
    asset_id: &str,
    transaction_id: &str,
    edit: &TransactionEdit,
    settings: &LedgerSettings,
) -> Result<LedgerOutcome> {
    if let Some(quantity) = edit.quantity {
        ensure_positive("quantity", quantity)?;
    }
    if let Some(price) = edit.price_per_coin {
        ensure_not_negative("pricePerCoin", price)?;
    }
    if let Some(total) = edit.total_cost {
        ensure_not_negative("totalCost", total)?;
    }

    let mut next = state.clone();
    let Some(portfolio) = next.find_portfolio_mut(portfolio_id) else {
        return Ok(LedgerOutcome::no_op(format!("Portfolio {} not found", portfolio_id)));
    };
    let referenced_by_closed = portfolio
        .closed_positions
        .iter()
        .any(|cp| cp.buy_transaction_id == transaction_id);
    let Some(asset) = portfolio.find_asset_mut(asset_id) else {
        return Ok(LedgerOutcome::no_op(format!("Asset {} not found", asset_id)));
    };
    let Some(current) = asset.find_transaction(transaction_id).cloned() else {
        return Ok(LedgerOutcome::no_op(format!("Transaction {} not found", transaction_id)));
    };

    if !edit.changes_economics(&current) {
        let tx = asset
            .find_transaction_mut(transaction_id)
            .ok_or_else(|| Error::Unexpected("transaction vanished".to_string()))?;
        let before = tx.clone();
        edit.apply_metadata(tx);
        if *tx == before {
            return Ok(LedgerOutcome::no_op("Nothing to change"));
        }
        return Ok(applied(next, Vec::new(), Vec::new()));
    }

    if let Some(reason) = economic_edit_blocker(&current) {
        return Ok(LedgerOutcome::Rejected(ValidationResult::fail(
            ValidationFailure::UnsupportedEdit {
                transaction_type: current.transaction_type,
            },
            reason,
        )));
    }

    let mut updated = current.clone();
    if current.is_acquisition() {
        let (quantity, price, total) = edit.derive_amounts(&current);
        updated.quantity = quantity;
        updated.price_per_coin = price;
        updated.total_cost = total;
    } else {
        if edit.price_per_coin.is_some() || edit.total_cost.is_some() {
            return Ok(LedgerOutcome::Rejected(ValidationResult::fail(
                ValidationFailure::UnsupportedEdit {
                    transaction_type: current.transaction_type,
                },
                "The cost of a withdrawal follows from its lots; edit the quantity or date instead",
            )));
        }
        let others: Vec<Transaction> = asset
            .transactions
            .iter()
            .filter(|tx| tx.id != current.id)
            .cloned()
            .collect();
        let quantity = edit.quantity.unwrap_or(current.quantity);
        let available = recompute(&others).quantity;
        let balance = check_available(&asset.ticker, available, quantity);
        if !balance.valid {
            return Ok(LedgerOutcome::Rejected(balance));
        }
        let resolution = resolve_fifo(&others, quantity, &asset.currency, settings);
        updated.quantity = quantity;
        updated.total_cost = resolution.native_cost_consumed;
        updated.price_per_coin = resolution.native_cost_consumed / quantity;
    }
    if let Some(date) = edit.date {
        updated.date = date;
    }
    edit.apply_metadata(&mut updated);

    let candidate: Vec<Transaction> = asset
        .transactions
        .iter()
        .map(|tx| if tx.id == updated.id { updated.clone() } else { tx.clone() })
        .collect();
    let after = recompute(&candidate).quantity;
    if after.is_sign_negative() && is_quantity_significant(&after) {
        return Ok(LedgerOutcome::Rejected(ValidationResult::fail(
            ValidationFailure::InsufficientBalance {
                ticker: asset.ticker.clone(),
                requested: -after,
                available: Decimal::ZERO,
            },
            format!(
                "This edit would leave {} at {}: later disposals depend on the original amount",
                asset.ticker,
                after.normalize()
            ),
        )));
    }

    let mut warnings = Vec::new();
    if referenced_by_closed && current.is_acquisition() {
        warnings.push(
            LedgerWarning::new(
                WarningKind::LotReferencedByClosedPositions,
                "Closed positions realized against this lot keep their original cost basis",
            )
            .in_portfolio(portfolio_id)
            .for_ticker(&asset.ticker),
        );
    }

    info!(
        "Edited {} {} on {}: quantity {} -> {}, total {} -> {}",
        current.transaction_type,
        current.id,
        asset.ticker,
        current.quantity,
        updated.quantity,
        current.total_cost,
        updated.total_cost
    );
    asset.transactions = candidate;
    asset.recalculate_aggregates();

    let mut effects = Vec::new();
    remove_depleted(state, &mut next, &mut effects);
    Ok(applied(next, effects, warnings))
}

fn economic_edit_blocker(tx: &Transaction) -> Option<&'static str> {
    if tx.is_transfer_copy() {
        return Some("Transferred lots follow their transfer; edit or delete the transfer in the source portfolio");
    }
    if tx.is_linked() {
        return Some("Both halves of a swap must stay consistent; delete the swap and record it again");
    }
    match tx.transaction_type {
        TransactionType::Sell => Some("Sales carry realized gains; delete the sale and record it again"),
        TransactionType::Transfer => Some("Transfers move lots between portfolios; delete the transfer and record it again"),
        _ => None,
    }
}
