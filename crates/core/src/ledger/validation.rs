//! Pre-flight checks shared by the application, edit and reversal engines.
//!
//! Business-rule failures come back as [`ValidationResult`] values. Only
//! malformed input (a non-positive quantity, a negative price) is an `Err`.

use rust_decimal::Decimal;
use std::collections::HashSet;

use super::chain_tracker::{find_chain, ChainLink};
use super::ledger_model::{ValidationFailure, ValidationResult};
use super::open_lots::open_lots;
use crate::assets::{base_symbol, is_quantity_significant, Asset};
use crate::errors::{LedgerError, Result};
use crate::portfolio::{LedgerState, Portfolio};
use crate::transactions::{Transaction, TransactionType};

pub fn ensure_positive(field: &str, value: Decimal) -> Result<()> {
    if value <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveQuantity {
            field: field.to_string(),
            value,
        }
        .into());
    }
    Ok(())
}

pub fn ensure_not_negative(field: &str, value: Decimal) -> Result<()> {
    if value < Decimal::ZERO {
        return Err(LedgerError::InvalidCommand(format!("{} must not be negative, got {}", field, value)).into());
    }
    Ok(())
}

/// `requested` may be taken from `asset` without going negative.
pub fn check_balance(asset: &Asset, requested: Decimal) -> ValidationResult {
    check_available(&asset.ticker, asset.quantity, requested)
}

pub fn check_available(ticker: &str, available: Decimal, requested: Decimal) -> ValidationResult {
    let shortfall = requested - available;
    if shortfall > Decimal::ZERO && is_quantity_significant(&shortfall) {
        return ValidationResult::fail(
            ValidationFailure::InsufficientBalance {
                ticker: ticker.to_string(),
                requested,
                available,
            },
            format!(
                "Insufficient {} balance: requested {}, only {} held",
                ticker,
                requested.normalize(),
                available.normalize()
            ),
        );
    }
    ValidationResult::ok()
}

/// Removing `transaction_id` must not leave the asset short.
pub fn check_removal_keeps_balance(asset: &Asset, transaction_id: &str) -> ValidationResult {
    let remaining = asset.quantity_without(transaction_id);
    if remaining.is_sign_negative() && is_quantity_significant(&remaining) {
        return ValidationResult::fail(
            ValidationFailure::InsufficientBalance {
                ticker: asset.ticker.clone(),
                requested: -remaining,
                available: Decimal::ZERO,
            },
            format!(
                "Removing this transaction would leave {} at {}: later disposals already used it",
                asset.ticker,
                remaining.normalize()
            ),
        );
    }
    ValidationResult::ok()
}

pub fn proceeds_consumed(ticker: &str, chain: Vec<ChainLink>) -> ValidationResult {
    ValidationResult::fail(
        ValidationFailure::ProceedsConsumed {
            ticker: ticker.to_string(),
        },
        format!(
            "The {} received in this swap was already spent. Reverse what used it first.",
            ticker
        ),
    )
    .with_chain(chain)
}

/// `lot` must still be fully open before it can be removed.
///
/// A lot drawn down by a later sale fails with the swap chain starting at
/// `chain_ticker`, most recent hop first. One drawn down by a withdrawal fails
/// as consumed proceeds.
pub fn check_lot_unconsumed(portfolio: &Portfolio, asset: &Asset, lot: &Transaction, chain_ticker: &str) -> ValidationResult {
    let remaining = open_lots(&asset.transactions)
        .iter()
        .find(|open| open.lot.id == lot.id)
        .map_or(Decimal::ZERO, |open| open.remaining_quantity);
    let consumed = lot.quantity - remaining;
    if consumed <= Decimal::ZERO || !is_quantity_significant(&consumed) {
        return ValidationResult::ok();
    }

    let sold_onward = portfolio
        .closed_positions
        .iter()
        .any(|cp| cp.buy_transaction_id == lot.id);
    if sold_onward {
        let chain = most_recent_first(find_chain(chain_ticker, portfolio));
        return chain_blocked(chain_ticker, chain);
    }
    proceeds_consumed(&asset.ticker, most_recent_first(find_chain(&asset.ticker, portfolio)))
}

/// A transfer copy can only be removed through the TRANSFER that made it.
pub fn check_not_transfer_copy(state: &LedgerState, tx: &Transaction) -> ValidationResult {
    let Some(source_portfolio_id) = tx.transferred_from.as_deref() else {
        return ValidationResult::ok();
    };
    let Some(transfer_id) = tx.transfer_transaction_id.as_deref() else {
        return ValidationResult::ok();
    };
    let Some(source) = state.find_portfolio(source_portfolio_id) else {
        return ValidationResult::ok();
    };
    if source.find_transaction(transfer_id).is_none() {
        return ValidationResult::ok();
    }
    ValidationResult::fail(
        ValidationFailure::TransferCopy {
            source_portfolio_id: source_portfolio_id.to_string(),
            transfer_transaction_id: transfer_id.to_string(),
        },
        format!(
            "This lot was transferred in from portfolio '{}'. Delete the original transfer there instead.",
            source.name
        ),
    )
}

/// The destination of a TRANSFER still holds what it received.
pub fn check_destination_holds(
    destination: &Portfolio,
    ticker: &str,
    quantity: Decimal,
) -> ValidationResult {
    let available = destination
        .find_asset_by_ticker(ticker)
        .map(|a| a.quantity)
        .unwrap_or(Decimal::ZERO);
    let shortfall = quantity - available;
    if shortfall > Decimal::ZERO && is_quantity_significant(&shortfall) {
        return ValidationResult::fail(
            ValidationFailure::DestinationShortfall {
                ticker: ticker.to_string(),
                required: quantity,
                available,
            },
            format!(
                "Portfolio '{}' only holds {} {} of the {} transferred; reverse what it did with them first",
                destination.name,
                available.normalize(),
                ticker,
                quantity.normalize()
            ),
        );
    }
    ValidationResult::ok()
}

/// Outcome of inspecting the swaps hanging off a ticker.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainCheck {
    Clear,
    /// Only direct sales, none of whose proceeds were sold further.
    SingleHop(Vec<ChainLink>),
    /// Multi-hop chain, most recent hop first.
    Blocked(Vec<ChainLink>),
}

pub fn check_downstream_chain(portfolio: &Portfolio, ticker: &str) -> ChainCheck {
    let chain = find_chain(ticker, portfolio);
    if chain.is_empty() {
        return ChainCheck::Clear;
    }
    let start = base_symbol(ticker);
    if chain.iter().all(|link| base_symbol(&link.source_ticker) == start) {
        return ChainCheck::SingleHop(chain);
    }
    ChainCheck::Blocked(most_recent_first(chain))
}

pub fn most_recent_first(mut chain: Vec<ChainLink>) -> Vec<ChainLink> {
    chain.reverse();
    chain
}

pub fn chain_blocked(ticker: &str, chain: Vec<ChainLink>) -> ValidationResult {
    let path: Vec<String> = chain.iter().map(ChainLink::describe).collect();
    ValidationResult::fail(
        ValidationFailure::DownstreamChain {
            ticker: ticker.to_string(),
        },
        format!(
            "{} is part of a swap chain. Reverse these first, in order: {}",
            ticker,
            path.join("; ")
        ),
    )
    .with_chain(chain)
}

/// Transfer ids in `portfolio` whose copies still exist in another portfolio.
pub fn live_outgoing_transfers(state: &LedgerState, portfolio: &Portfolio, asset: Option<&Asset>) -> Vec<String> {
    let outgoing: HashSet<&str> = portfolio
        .assets
        .iter()
        .filter(|a| asset.map_or(true, |only| only.id == a.id))
        .flat_map(|a| a.transactions.iter())
        .filter(|tx| tx.transaction_type == TransactionType::Transfer)
        .map(|tx| tx.id.as_str())
        .collect();

    let mut live: Vec<String> = state
        .portfolios
        .iter()
        .filter(|p| p.id != portfolio.id)
        .flat_map(|p| p.assets.iter())
        .flat_map(|a| a.transactions.iter())
        .filter_map(|tx| tx.transfer_transaction_id.as_deref())
        .filter(|id| outgoing.contains(id))
        .map(str::to_string)
        .collect();
    live.sort();
    live.dedup();
    live
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ensure_positive_rejects_zero() {
        assert!(ensure_positive("quantity", dec!(0)).is_err());
        assert!(ensure_positive("quantity", dec!(0.1)).is_ok());
    }

    #[test]
    fn test_balance_tolerates_dust() {
        assert!(check_available("BTC", dec!(1), dec!(1.000000001)).valid);
        let result = check_available("BTC", dec!(1), dec!(1.5));
        assert!(!result.valid);
        assert!(matches!(
            result.failure,
            Some(ValidationFailure::InsufficientBalance { .. })
        ));
    }
}
