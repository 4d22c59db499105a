//! Builders shared by the ledger test suites. Every state is produced through
//! the engine itself so fixtures never bypass the invariants under test.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::apply_engine::apply_command;
use super::ledger_model::{
    AcquisitionCommand, LedgerCommand, LedgerOutcome, SwapCommand, TransferCommand,
    WithdrawalCommand,
};
use super::portfolio_ops::create_portfolio;
use crate::assets::Asset;
use crate::fx::RateSnapshot;
use crate::portfolio::{LedgerState, Portfolio};
use crate::settings::LedgerSettings;
use crate::transactions::{Transaction, TransactionType};

pub(crate) fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

pub(crate) fn settings() -> LedgerSettings {
    LedgerSettings::default().with_fallback_rates(RateSnapshot::new().with_rate("EUR", dec!(0.9)))
}

pub(crate) fn expect_applied(outcome: LedgerOutcome) -> LedgerState {
    match outcome {
        LedgerOutcome::Applied(change) => change.state,
        other => panic!("expected Applied, got {:?}", other),
    }
}

pub(crate) fn with_portfolio(state: &LedgerState, name: &str) -> (LedgerState, String) {
    let (outcome, id) = create_portfolio(state, name).unwrap();
    (expect_applied(outcome), id)
}

pub(crate) fn new_ledger() -> (LedgerState, String) {
    with_portfolio(&LedgerState::new(), "Main")
}

pub(crate) fn acquisition(pid: &str, ticker: &str, qty: Decimal, price: Decimal, d: u32) -> AcquisitionCommand {
    AcquisitionCommand {
        portfolio_id: pid.to_string(),
        ticker: ticker.to_string(),
        name: None,
        asset_currency: None,
        quantity: qty,
        price_per_coin: price,
        date: day(d),
        purchase_currency: "USD".to_string(),
        tag: None,
        exchange_rates: None,
        notes: None,
        deposit_source: None,
        income_type: None,
        income_source: None,
    }
}

pub(crate) fn buy(state: &LedgerState, pid: &str, ticker: &str, qty: Decimal, price: Decimal, d: u32) -> LedgerState {
    let command = LedgerCommand::Buy(acquisition(pid, ticker, qty, price, d));
    expect_applied(apply_command(state, &command, &settings()).unwrap())
}

pub(crate) fn deposit(state: &LedgerState, pid: &str, ticker: &str, qty: Decimal, price: Decimal, d: u32) -> LedgerState {
    let command = LedgerCommand::Deposit(acquisition(pid, ticker, qty, price, d));
    expect_applied(apply_command(state, &command, &settings()).unwrap())
}

pub(crate) fn withdrawal_command(pid: &str, asset_id: &str, qty: Decimal, d: u32) -> LedgerCommand {
    LedgerCommand::Withdrawal(WithdrawalCommand {
        portfolio_id: pid.to_string(),
        asset_id: asset_id.to_string(),
        quantity: qty,
        date: day(d),
        tag: None,
        withdrawal_destination: None,
        exchange_rates: None,
        notes: None,
    })
}

pub(crate) fn withdraw(state: &LedgerState, pid: &str, ticker: &str, qty: Decimal, d: u32) -> LedgerState {
    let asset_id = asset(state, pid, ticker).id.clone();
    expect_applied(apply_command(state, &withdrawal_command(pid, &asset_id, qty, d), &settings()).unwrap())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn swap_command(
    state: &LedgerState,
    pid: &str,
    source: &str,
    source_qty: Decimal,
    destination: &str,
    destination_qty: Decimal,
    price: Decimal,
    d: u32,
) -> LedgerCommand {
    LedgerCommand::Swap(SwapCommand {
        portfolio_id: pid.to_string(),
        source_asset_id: asset(state, pid, source).id.clone(),
        source_quantity: source_qty,
        destination_ticker: destination.to_string(),
        destination_name: None,
        destination_currency: None,
        destination_quantity: destination_qty,
        price_per_coin: price,
        purchase_currency: "USD".to_string(),
        date: day(d),
        tag: None,
        exchange_rates: None,
        notes: None,
    })
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn swap(
    state: &LedgerState,
    pid: &str,
    source: &str,
    source_qty: Decimal,
    destination: &str,
    destination_qty: Decimal,
    price: Decimal,
    d: u32,
) -> LedgerState {
    let command = swap_command(state, pid, source, source_qty, destination, destination_qty, price, d);
    expect_applied(apply_command(state, &command, &settings()).unwrap())
}

pub(crate) fn transfer(state: &LedgerState, from: &str, ticker: &str, to: &str, qty: Decimal, d: u32) -> LedgerState {
    let command = LedgerCommand::Transfer(TransferCommand {
        source_portfolio_id: from.to_string(),
        asset_id: asset(state, from, ticker).id.clone(),
        destination_portfolio_id: to.to_string(),
        quantity: qty,
        date: day(d),
        tag: None,
        notes: None,
    });
    expect_applied(apply_command(state, &command, &settings()).unwrap())
}

pub(crate) fn portfolio<'a>(state: &'a LedgerState, pid: &str) -> &'a Portfolio {
    state.find_portfolio(pid).unwrap()
}

pub(crate) fn asset<'a>(state: &'a LedgerState, pid: &str, ticker: &str) -> &'a Asset {
    portfolio(state, pid)
        .find_asset_by_ticker(ticker)
        .unwrap_or_else(|| panic!("no {} in portfolio {}", ticker, pid))
}

pub(crate) fn has_asset(state: &LedgerState, pid: &str, ticker: &str) -> bool {
    portfolio(state, pid).find_asset_by_ticker(ticker).is_some()
}

pub(crate) fn first_of_type(state: &LedgerState, pid: &str, ticker: &str, t: TransactionType) -> Transaction {
    asset(state, pid, ticker)
        .transactions
        .iter()
        .find(|tx| tx.transaction_type == t)
        .cloned()
        .unwrap_or_else(|| panic!("no {} on {}", t, ticker))
}
