//! Property-based integration tests for the ledger engine.
//!
//! Random histories of every command kind, spread over two portfolios, are
//! driven through the public API. The lot-accounting invariants are checked
//! after every step, and each step is reversed against the state it produced.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

use lotfolio_core::ledger::open_lots::acquisitions_fifo;
use lotfolio_core::ledger::{
    apply_command, create_portfolio, delete_transaction, open_lots, AcquisitionCommand, LedgerCommand,
    LedgerEffect, LedgerOutcome, SwapCommand, TransferCommand, WithdrawalCommand,
};
use lotfolio_core::settings::LedgerSettings;
use lotfolio_core::transactions::TransactionType;
use lotfolio_core::{recompute, LedgerState};

// =============================================================================
// Generators
// =============================================================================

const TICKERS: [&str; 2] = ["BTC", "ETH"];

#[derive(Debug, Clone, Copy)]
enum Received {
    Buy,
    Deposit,
    Income,
}

#[derive(Debug, Clone)]
enum Step {
    Acquire {
        kind: Received,
        cold: bool,
        ticker: usize,
        quantity: u32,
        price: u32,
    },
    Withdraw {
        cold: bool,
        ticker: usize,
        quantity: u32,
    },
    /// BTC into ETH within one portfolio.
    Swap { cold: bool, quantity: u32, rate: u32 },
    /// From the main portfolio to the cold one.
    Transfer { ticker: usize, quantity: u32 },
}

fn arb_received() -> impl Strategy<Value = Received> {
    prop_oneof![Just(Received::Buy), Just(Received::Deposit), Just(Received::Income)]
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (arb_received(), any::<bool>(), 0..TICKERS.len(), 1u32..50, 1u32..500).prop_map(
            |(kind, cold, ticker, quantity, price)| Step::Acquire { kind, cold, ticker, quantity, price }
        ),
        2 => (any::<bool>(), 0..TICKERS.len(), 1u32..60)
            .prop_map(|(cold, ticker, quantity)| Step::Withdraw { cold, ticker, quantity }),
        2 => (any::<bool>(), 1u32..40, 1u32..20).prop_map(|(cold, quantity, rate)| Step::Swap { cold, quantity, rate }),
        2 => (0..TICKERS.len(), 1u32..40).prop_map(|(ticker, quantity)| Step::Transfer { ticker, quantity }),
    ]
}

fn arb_history() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(arb_step(), 1..24)
}

// =============================================================================
// Helpers
// =============================================================================

fn day(offset: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(offset as i64)
}

fn applied(outcome: LedgerOutcome) -> LedgerState {
    match outcome {
        LedgerOutcome::Applied(change) => change.state,
        other => panic!("expected Applied, got {:?}", other),
    }
}

fn acquisition(pid: &str, ticker: &str, quantity: u32, price: u32, offset: usize) -> AcquisitionCommand {
    AcquisitionCommand {
        portfolio_id: pid.to_string(),
        ticker: ticker.to_string(),
        name: None,
        asset_currency: None,
        quantity: Decimal::from(quantity),
        price_per_coin: Decimal::from(price),
        date: day(offset),
        purchase_currency: "USD".to_string(),
        tag: None,
        exchange_rates: None,
        notes: None,
        deposit_source: None,
        income_type: None,
        income_source: None,
    }
}

/// Whole units held of `ticker`, with the asset id.
fn held(state: &LedgerState, pid: &str, ticker: &str) -> Option<(String, Decimal)> {
    state
        .find_portfolio(pid)
        .and_then(|p| p.find_asset_by_ticker(ticker))
        .map(|a| (a.id.clone(), a.quantity))
}

/// Quantity per (portfolio, ticker), the part of a state a lossy reversal keeps.
fn holdings(state: &LedgerState) -> BTreeMap<(String, String), Decimal> {
    state
        .portfolios
        .iter()
        .flat_map(|p| p.assets.iter().map(move |a| ((p.id.clone(), a.ticker.clone()), a.quantity)))
        .collect()
}

/// The transaction a step recorded, found in the state it produced.
#[derive(Debug, Clone)]
struct Recorded {
    portfolio_id: String,
    ticker: String,
    transaction_id: String,
    /// The step emptied and removed an asset.
    drained: bool,
}

struct Replay {
    /// `states[0]` is the empty ledger; `states[i + 1]` follows `recorded[i]`.
    states: Vec<LedgerState>,
    recorded: Vec<Recorded>,
}

fn build_command(
    state: &LedgerState,
    main: &str,
    cold: &str,
    step: &Step,
    offset: usize,
) -> Option<(LedgerCommand, TransactionType)> {
    let book = |is_cold: bool| if is_cold { cold } else { main };
    match step {
        Step::Acquire { kind, cold: is_cold, ticker, quantity, price } => {
            let command = acquisition(book(*is_cold), TICKERS[*ticker], *quantity, *price, offset);
            Some(match kind {
                Received::Buy => (LedgerCommand::Buy(command), TransactionType::Buy),
                Received::Deposit => (LedgerCommand::Deposit(command), TransactionType::Deposit),
                Received::Income => (LedgerCommand::Income(command), TransactionType::Income),
            })
        }
        Step::Withdraw { cold: is_cold, ticker, quantity } => {
            let pid = book(*is_cold);
            let (asset_id, available) = held(state, pid, TICKERS[*ticker])?;
            let command = LedgerCommand::Withdrawal(WithdrawalCommand {
                portfolio_id: pid.to_string(),
                asset_id,
                quantity: Decimal::from(*quantity).min(available),
                date: day(offset),
                tag: None,
                withdrawal_destination: None,
                exchange_rates: None,
                notes: None,
            });
            Some((command, TransactionType::Withdrawal))
        }
        Step::Swap { cold: is_cold, quantity, rate } => {
            let pid = book(*is_cold);
            let (source_asset_id, available) = held(state, pid, "BTC")?;
            let source_quantity = Decimal::from(*quantity).min(available);
            let command = LedgerCommand::Swap(SwapCommand {
                portfolio_id: pid.to_string(),
                source_asset_id,
                source_quantity,
                destination_ticker: "ETH".to_string(),
                destination_name: None,
                destination_currency: None,
                destination_quantity: source_quantity * Decimal::from(*rate),
                price_per_coin: dec!(25),
                purchase_currency: "USD".to_string(),
                date: day(offset),
                tag: None,
                exchange_rates: None,
                notes: None,
            });
            Some((command, TransactionType::Buy))
        }
        Step::Transfer { ticker, quantity } => {
            let (asset_id, available) = held(state, main, TICKERS[*ticker])?;
            let command = LedgerCommand::Transfer(TransferCommand {
                source_portfolio_id: main.to_string(),
                asset_id,
                destination_portfolio_id: cold.to_string(),
                quantity: Decimal::from(*quantity).min(available),
                date: day(offset),
                tag: None,
                notes: None,
            });
            Some((command, TransactionType::Transfer))
        }
    }
}

/// Replays a history, skipping steps that need a position nothing holds.
fn replay(steps: &[Step]) -> Replay {
    let settings = LedgerSettings::default();
    let (outcome, main) = create_portfolio(&LedgerState::new(), "Main").unwrap();
    let (outcome, cold) = create_portfolio(&applied(outcome), "Cold").unwrap();
    let mut states = vec![applied(outcome)];
    let mut recorded = Vec::new();

    for (offset, step) in steps.iter().enumerate() {
        let state = states.last().cloned().unwrap();
        let Some((command, recorded_type)) = build_command(&state, &main, &cold, step, offset) else {
            continue;
        };
        let change = match apply_command(&state, &command, &settings).unwrap() {
            LedgerOutcome::Applied(change) => change,
            other => panic!("{:?} was not applied: {:?}", step, other),
        };
        let record = change.effects.iter().find_map(|effect| match effect {
            LedgerEffect::CreateTransaction {
                portfolio_id,
                ticker,
                transaction_id,
                transaction_type,
                ..
            } if portfolio_id == command.portfolio_id() && *transaction_type == recorded_type => Some(Recorded {
                portfolio_id: portfolio_id.clone(),
                ticker: ticker.clone(),
                transaction_id: transaction_id.clone(),
                drained: change.effects.iter().any(|e| matches!(e, LedgerEffect::RemoveAsset { .. })),
            }),
            _ => None,
        });
        recorded.push(record.unwrap_or_else(|| panic!("{:?} recorded no {}", step, recorded_type)));
        states.push(change.state);
    }
    Replay { states, recorded }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Stored aggregates equal a fresh recomputation and what the open lots hold.
    #[test]
    fn prop_aggregates_match_open_lots(steps in arb_history()) {
        let replay = replay(&steps);
        for state in &replay.states {
            for asset in state.portfolios.iter().flat_map(|p| p.assets.iter()) {
                prop_assert_eq!(recompute(&asset.transactions), asset.aggregates());

                let lots = open_lots(&asset.transactions);
                let held: Decimal = lots.iter().map(|l| l.remaining_quantity).sum();
                let cost: Decimal = lots.iter().map(|l| l.remaining_cost).sum();
                prop_assert_eq!(held, asset.quantity);
                prop_assert!((cost - asset.total_cost_basis).abs() < dec!(0.000001));
                prop_assert!(asset.quantity > Decimal::ZERO);
            }
        }
    }

    /// Open lots are a suffix of the FIFO order with only the oldest one partially consumed.
    #[test]
    fn prop_fifo_consumes_oldest_first(steps in arb_history()) {
        let replay = replay(&steps);
        let state = replay.states.last().unwrap();
        for asset in state.portfolios.iter().flat_map(|p| p.assets.iter()) {
            let fifo = acquisitions_fifo(&asset.transactions);
            let lots = open_lots(&asset.transactions);
            let skipped = fifo.len() - lots.len();
            for (index, lot) in lots.iter().enumerate() {
                prop_assert_eq!(&lot.lot.id, &fifo[skipped + index].id);
                if index > 0 {
                    prop_assert_eq!(lot.remaining_quantity, lot.lot.quantity);
                }
            }
        }
    }

    /// Deleting what the latest command recorded returns the state before it.
    /// When the command removed an emptied asset the ids are new, so only the
    /// holdings have to match.
    #[test]
    fn prop_last_command_reverses_to_prior_state(steps in arb_history()) {
        let replay = replay(&steps);
        let settings = LedgerSettings::default();

        for (index, record) in replay.recorded.iter().enumerate() {
            let before = &replay.states[index];
            let after = &replay.states[index + 1];
            let Some(asset) = after
                .find_portfolio(&record.portfolio_id)
                .and_then(|p| p.find_asset_by_ticker(&record.ticker))
                .filter(|a| a.find_transaction(&record.transaction_id).is_some())
            else {
                // A draining withdrawal or transfer takes its asset, and the transaction, with it.
                prop_assert!(record.drained);
                continue;
            };

            let outcome = delete_transaction(after, &record.portfolio_id, &asset.id, &record.transaction_id, true, &settings);
            let restored = applied(outcome);
            if record.drained {
                prop_assert_eq!(holdings(&restored), holdings(before));
            } else {
                prop_assert_eq!(&restored, before);
            }
        }
    }
}
