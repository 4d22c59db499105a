//! State transitions for new transactions.
//!
//! Each entry point takes the current [`LedgerState`] by reference and returns
//! the next one inside [`LedgerOutcome::Applied`]; the input is never touched.

use log::{debug, info};
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

use super::fifo_resolver::{build_closed_positions, resolve_fifo, DisposalContext};
use super::ledger_model::{
    AcquisitionCommand, LedgerChange, LedgerCommand, LedgerEffect, LedgerOutcome, LedgerWarning,
    SwapCommand, TransferCommand, ValidationFailure, ValidationResult, WarningKind,
    WithdrawalCommand,
};
use super::validation::{check_balance, ensure_not_negative, ensure_positive};
use crate::assets::{is_cash_like, same_symbol};
use crate::constants::DEFAULT_TAG;
use crate::errors::{LedgerError, Result};
use crate::fx::convert_or_passthrough;
use crate::portfolio::LedgerState;
use crate::settings::LedgerSettings;
use crate::transactions::{Transaction, TransactionType};

/// Applies one command. `Err` only for malformed commands.
pub fn apply_command(
    state: &LedgerState,
    command: &LedgerCommand,
    settings: &LedgerSettings,
) -> Result<LedgerOutcome> {
    debug!("Applying {} command", command.label());
    match command {
        LedgerCommand::Buy(c) => apply_acquisition(state, TransactionType::Buy, c),
        LedgerCommand::Deposit(c) => apply_acquisition(state, TransactionType::Deposit, c),
        LedgerCommand::Income(c) => apply_acquisition(state, TransactionType::Income, c),
        LedgerCommand::Withdrawal(c) => apply_withdrawal(state, c, settings),
        LedgerCommand::Swap(c) => apply_swap(state, c, settings),
        LedgerCommand::Transfer(c) => apply_transfer(state, c, settings),
    }
}

fn tag_or_default(tag: &Option<String>) -> String {
    tag.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TAG)
        .to_string()
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// DEPOSIT, INCOME, or a BUY paid from outside the ledger: one new lot.
pub fn apply_acquisition(
    state: &LedgerState,
    transaction_type: TransactionType,
    command: &AcquisitionCommand,
) -> Result<LedgerOutcome> {
    if !transaction_type.is_acquisition() {
        return Err(LedgerError::InvalidCommand(format!("{} is not an acquisition", transaction_type)).into());
    }
    ensure_positive("quantity", command.quantity)?;
    ensure_not_negative("pricePerCoin", command.price_per_coin)?;
    if command.ticker.trim().is_empty() {
        return Err(LedgerError::InvalidCommand("ticker is required".to_string()).into());
    }

    let mut next = state.clone();
    let sequence = next.next_sequence();
    let Some(portfolio) = next.find_portfolio_mut(&command.portfolio_id) else {
        return Ok(LedgerOutcome::no_op(format!("Portfolio {} not found", command.portfolio_id)));
    };

    let purchase_currency = command.purchase_currency.trim().to_uppercase();
    let mut tx = Transaction::new(
        transaction_type,
        command.quantity,
        command.price_per_coin,
        command.date,
        &purchase_currency,
        &tag_or_default(&command.tag),
        sequence,
    );
    tx.exchange_rate_at_purchase = command.exchange_rates.clone();
    tx.notes = clean(&command.notes);
    match transaction_type {
        TransactionType::Deposit => tx.deposit_source = clean(&command.deposit_source),
        TransactionType::Income => {
            tx.income_type = clean(&command.income_type);
            tx.income_source = clean(&command.income_source);
        }
        _ => {}
    }

    let mut effects = Vec::new();
    let created = portfolio.find_asset_by_ticker(&command.ticker).is_none();
    let asset_currency = command
        .asset_currency
        .clone()
        .unwrap_or_else(|| purchase_currency.clone());
    let asset = portfolio.asset_for_ticker_mut(&command.ticker, command.name.as_deref(), &asset_currency);
    if created {
        effects.push(LedgerEffect::CreateAsset {
            portfolio_id: command.portfolio_id.clone(),
            ticker: asset.ticker.clone(),
        });
    }
    effects.push(LedgerEffect::CreateTransaction {
        portfolio_id: command.portfolio_id.clone(),
        ticker: asset.ticker.clone(),
        transaction_id: tx.id.clone(),
        transaction_type,
        quantity: tx.quantity,
    });
    info!(
        "{} {} {} @ {} {} into portfolio {}",
        transaction_type, tx.quantity, asset.ticker, tx.price_per_coin, purchase_currency, command.portfolio_id
    );
    asset.push_transaction(tx);

    Ok(applied(next, effects, Vec::new()))
}

/// Disposal to outside the ledger. Cost basis leaves FIFO; nothing is realized.
pub fn apply_withdrawal(
    state: &LedgerState,
    command: &WithdrawalCommand,
    settings: &LedgerSettings,
) -> Result<LedgerOutcome> {
    ensure_positive("quantity", command.quantity)?;

    let mut next = state.clone();
    let sequence = next.next_sequence();
    let Some(portfolio) = next.find_portfolio_mut(&command.portfolio_id) else {
        return Ok(LedgerOutcome::no_op(format!("Portfolio {} not found", command.portfolio_id)));
    };
    let Some(asset) = portfolio.find_asset_mut(&command.asset_id) else {
        return Ok(LedgerOutcome::no_op(format!("Asset {} not found", command.asset_id)));
    };

    let balance = check_balance(asset, command.quantity);
    if !balance.valid {
        return Ok(LedgerOutcome::Rejected(balance));
    }

    let resolution = resolve_fifo(&asset.transactions, command.quantity, &asset.currency, settings);
    let mut tx = Transaction::disposal(
        TransactionType::Withdrawal,
        command.quantity,
        resolution.native_cost_consumed,
        command.date,
        &asset.currency,
        &tag_or_default(&command.tag),
        sequence,
    );
    tx.withdrawal_destination = clean(&command.withdrawal_destination);
    tx.exchange_rate_at_purchase = command.exchange_rates.clone();
    tx.notes = clean(&command.notes);

    let mut warnings = Vec::new();
    if resolution.has_shortfall() {
        warnings.push(shortfall_warning(&asset.ticker, resolution.unmatched_quantity, &command.portfolio_id));
    }
    let mut effects = vec![LedgerEffect::CreateTransaction {
        portfolio_id: command.portfolio_id.clone(),
        ticker: asset.ticker.clone(),
        transaction_id: tx.id.clone(),
        transaction_type: TransactionType::Withdrawal,
        quantity: tx.quantity,
    }];
    asset.push_transaction(tx);

    remove_depleted(state, &mut next, &mut effects);
    Ok(applied(next, effects, warnings))
}

/// Spends one asset to acquire another: a SELL and a BUY tied by a pair id.
pub fn apply_swap(
    state: &LedgerState,
    command: &SwapCommand,
    settings: &LedgerSettings,
) -> Result<LedgerOutcome> {
    ensure_positive("sourceQuantity", command.source_quantity)?;
    ensure_positive("destinationQuantity", command.destination_quantity)?;
    ensure_not_negative("pricePerCoin", command.price_per_coin)?;
    let destination_ticker = command.destination_ticker.trim().to_uppercase();
    if destination_ticker.is_empty() {
        return Err(LedgerError::InvalidCommand("destinationTicker is required".to_string()).into());
    }

    let mut next = state.clone();
    let sell_sequence = next.next_sequence();
    let buy_sequence = sell_sequence + 1;
    let Some(portfolio) = next.find_portfolio_mut(&command.portfolio_id) else {
        return Ok(LedgerOutcome::no_op(format!("Portfolio {} not found", command.portfolio_id)));
    };
    let Some(source) = portfolio.find_asset(&command.source_asset_id) else {
        return Ok(LedgerOutcome::no_op(format!("Asset {} not found", command.source_asset_id)));
    };
    if same_symbol(&source.ticker, &destination_ticker) {
        return Err(LedgerError::SelfSwap(source.ticker.clone()).into());
    }
    let balance = check_balance(source, command.source_quantity);
    if !balance.valid {
        return Ok(LedgerOutcome::Rejected(balance));
    }

    let source_ticker = source.ticker.clone();
    let source_currency = source.currency.clone();
    let resolution = resolve_fifo(&source.transactions, command.source_quantity, &source_currency, settings);

    let purchase_currency = command.purchase_currency.trim().to_uppercase();
    let destination_currency = portfolio
        .find_asset_by_ticker(&destination_ticker)
        .map(|a| a.currency.clone())
        .or_else(|| command.destination_currency.as_ref().map(|c| c.trim().to_uppercase()))
        .unwrap_or_else(|| purchase_currency.clone());
    let rates = command.exchange_rates.as_ref();
    let gross = command.destination_quantity * command.price_per_coin;
    let proceeds = convert_or_passthrough(
        gross,
        &purchase_currency,
        &source_currency,
        rates,
        &settings.fallback_rates,
    );
    let buy_total = convert_or_passthrough(
        gross,
        &purchase_currency,
        &destination_currency,
        rates,
        &settings.fallback_rates,
    );

    let tag = tag_or_default(&command.tag);
    let pair_id = Uuid::new_v4().to_string();
    let mut sell = Transaction::disposal(
        TransactionType::Sell,
        command.source_quantity,
        resolution.native_cost_consumed,
        command.date,
        &source_currency,
        &tag,
        sell_sequence,
    );
    let mut buy = Transaction::new(
        TransactionType::Buy,
        command.destination_quantity,
        buy_total / command.destination_quantity,
        command.date,
        &destination_currency,
        &tag,
        buy_sequence,
    );

    sell.proceeds_currency = Some(destination_ticker.clone());
    sell.destination_ticker = Some(destination_ticker.clone());
    sell.destination_quantity = Some(command.destination_quantity);
    sell.proceeds = Some(proceeds);
    sell.linked_buy_sell_transaction_id = Some(buy.id.clone());
    sell.transaction_pair_id = Some(pair_id.clone());
    sell.exchange_rate_at_purchase = command.exchange_rates.clone();
    sell.notes = clean(&command.notes);

    buy.source_ticker = Some(source_ticker.clone());
    buy.source_quantity = Some(command.source_quantity);
    buy.linked_buy_sell_transaction_id = Some(sell.id.clone());
    buy.transaction_pair_id = Some(pair_id);
    buy.exchange_rate_at_purchase = command.exchange_rates.clone();
    buy.notes = clean(&command.notes);

    let mut effects = Vec::new();
    let mut warnings = Vec::new();
    if resolution.has_shortfall() {
        warnings.push(shortfall_warning(&source_ticker, resolution.unmatched_quantity, &command.portfolio_id));
    }

    // Spending cash is not a disposal event: no realized P&L.
    let closed = if is_cash_like(&source_ticker) {
        Vec::new()
    } else {
        build_closed_positions(
            &resolution,
            DisposalContext {
                ticker: &source_ticker,
                sell: &sell,
                proceeds,
                proceeds_currency: &source_currency,
                proceeds_ticker: Some(&destination_ticker),
            },
            settings,
        )
    };

    effects.push(LedgerEffect::CreateTransaction {
        portfolio_id: command.portfolio_id.clone(),
        ticker: source_ticker.clone(),
        transaction_id: sell.id.clone(),
        transaction_type: TransactionType::Sell,
        quantity: sell.quantity,
    });
    if portfolio.find_asset_by_ticker(&destination_ticker).is_none() {
        effects.push(LedgerEffect::CreateAsset {
            portfolio_id: command.portfolio_id.clone(),
            ticker: destination_ticker.clone(),
        });
    }
    effects.push(LedgerEffect::CreateTransaction {
        portfolio_id: command.portfolio_id.clone(),
        ticker: destination_ticker.clone(),
        transaction_id: buy.id.clone(),
        transaction_type: TransactionType::Buy,
        quantity: buy.quantity,
    });
    if !closed.is_empty() {
        effects.push(LedgerEffect::CreateClosedPositions {
            portfolio_id: command.portfolio_id.clone(),
            ticker: source_ticker.clone(),
            count: closed.len(),
            realized_pnl: closed.iter().map(|cp| cp.realized_pnl).sum(),
        });
    }

    info!(
        "Swap {} {} -> {} {} in portfolio {} ({} closed position(s))",
        command.source_quantity,
        source_ticker,
        command.destination_quantity,
        destination_ticker,
        command.portfolio_id,
        closed.len()
    );

    if let Some(source) = portfolio.find_asset_mut(&command.source_asset_id) {
        source.push_transaction(sell);
    }
    portfolio
        .asset_for_ticker_mut(&destination_ticker, command.destination_name.as_deref(), &destination_currency)
        .push_transaction(buy);
    portfolio.closed_positions.extend(closed);

    remove_depleted(state, &mut next, &mut effects);
    Ok(applied(next, effects, warnings))
}

/// Moves lot slices FIFO from one portfolio to another, cost basis intact.
pub fn apply_transfer(
    state: &LedgerState,
    command: &TransferCommand,
    settings: &LedgerSettings,
) -> Result<LedgerOutcome> {
    ensure_positive("quantity", command.quantity)?;
    if command.source_portfolio_id == command.destination_portfolio_id {
        return Err(LedgerError::InvalidCommand("Cannot transfer into the same portfolio".to_string()).into());
    }

    let Some(source_portfolio) = state.find_portfolio(&command.source_portfolio_id) else {
        return Ok(LedgerOutcome::no_op(format!(
            "Portfolio {} not found",
            command.source_portfolio_id
        )));
    };
    let Some(asset) = source_portfolio.find_asset(&command.asset_id) else {
        return Ok(LedgerOutcome::no_op(format!("Asset {} not found", command.asset_id)));
    };
    if state.find_portfolio(&command.destination_portfolio_id).is_none() {
        return Ok(LedgerOutcome::Rejected(ValidationResult::fail(
            ValidationFailure::DanglingReference {
                reference: command.destination_portfolio_id.clone(),
            },
            format!("Destination portfolio {} does not exist", command.destination_portfolio_id),
        )));
    }
    let balance = check_balance(asset, command.quantity);
    if !balance.valid {
        return Ok(LedgerOutcome::Rejected(balance));
    }

    let resolution = resolve_fifo(&asset.transactions, command.quantity, &asset.currency, settings);
    let mut transfer = Transaction::disposal(
        TransactionType::Transfer,
        command.quantity,
        resolution.native_cost_consumed,
        command.date,
        &asset.currency,
        &tag_or_default(&command.tag),
        state.next_sequence(),
    );
    transfer.destination_portfolio_id = Some(command.destination_portfolio_id.clone());
    transfer.notes = clean(&command.notes);

    // Copies keep the lot's date, sequence and price so FIFO order survives the move.
    let copies: Vec<Transaction> = resolution
        .consumptions
        .iter()
        .map(|c| {
            let mut copy = c.lot.clone().without_linkage();
            copy.id = Uuid::new_v4().to_string();
            copy.quantity = c.quantity;
            copy.total_cost = c.native_cost;
            copy.transferred_from = Some(command.source_portfolio_id.clone());
            copy.transfer_transaction_id = Some(transfer.id.clone());
            copy
        })
        .collect();

    let ticker = asset.ticker.clone();
    let name = asset.name.clone();
    let currency = asset.currency.clone();
    let mut effects = vec![LedgerEffect::CreateTransaction {
        portfolio_id: command.source_portfolio_id.clone(),
        ticker: ticker.clone(),
        transaction_id: transfer.id.clone(),
        transaction_type: TransactionType::Transfer,
        quantity: transfer.quantity,
    }];

    let mut next = state.clone();
    if let Some(source) = next
        .find_portfolio_mut(&command.source_portfolio_id)
        .and_then(|p| p.find_asset_mut(&command.asset_id))
    {
        source.push_transaction(transfer);
    }
    if let Some(destination) = next.find_portfolio_mut(&command.destination_portfolio_id) {
        if destination.find_asset_by_ticker(&ticker).is_none() {
            effects.push(LedgerEffect::CreateAsset {
                portfolio_id: command.destination_portfolio_id.clone(),
                ticker: ticker.clone(),
            });
        }
        let target = destination.asset_for_ticker_mut(&ticker, Some(&name), &currency);
        for copy in copies {
            effects.push(LedgerEffect::CreateTransaction {
                portfolio_id: command.destination_portfolio_id.clone(),
                ticker: ticker.clone(),
                transaction_id: copy.id.clone(),
                transaction_type: copy.transaction_type,
                quantity: copy.quantity,
            });
            target.transactions.push(copy);
        }
        target.recalculate_aggregates();
    }

    info!(
        "Transferred {} {} from portfolio {} to {}",
        command.quantity, ticker, command.source_portfolio_id, command.destination_portfolio_id
    );
    remove_depleted(state, &mut next, &mut effects);
    Ok(applied(next, effects, Vec::new()))
}

fn shortfall_warning(ticker: &str, unmatched: Decimal, portfolio_id: &str) -> LedgerWarning {
    LedgerWarning::new(
        WarningKind::UnmatchedDisposal,
        format!("{} of the disposal had no lot on record to match", unmatched.normalize()),
    )
    .in_portfolio(portfolio_id)
    .for_ticker(ticker)
}

/// Drops every asset the command brought to zero, recording a removal effect
/// for each. Assets that already held nothing in `before` are left alone.
pub(crate) fn remove_depleted(before: &LedgerState, next: &mut LedgerState, effects: &mut Vec<LedgerEffect>) {
    let already_empty: HashSet<(&str, &str)> = before
        .portfolios
        .iter()
        .flat_map(|p| {
            p.assets
                .iter()
                .filter(|a| a.is_depleted())
                .map(move |a| (p.id.as_str(), a.id.as_str()))
        })
        .collect();
    for portfolio in next.portfolios.iter_mut() {
        let portfolio_id = portfolio.id.clone();
        let removed =
            portfolio.remove_depleted_assets(|a| already_empty.contains(&(portfolio_id.as_str(), a.id.as_str())));
        for asset in removed {
            debug!("Removing depleted asset {} from portfolio {}", asset.ticker, portfolio.id);
            effects.push(LedgerEffect::RemoveAsset {
                portfolio_id: portfolio.id.clone(),
                asset_id: asset.id,
                ticker: asset.ticker,
            });
        }
    }
}

pub(crate) fn applied(
    state: LedgerState,
    effects: Vec<LedgerEffect>,
    warnings: Vec<LedgerWarning>,
) -> LedgerOutcome {
    LedgerOutcome::Applied(LedgerChange {
        state,
        effects,
        warnings,
    })
}
