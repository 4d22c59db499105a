use super::ledger_model::*;
use super::reports::{audit, realized_summary};
use super::test_fixtures::*;
use crate::persistence::import_bundle;
use crate::portfolio::LedgerState;
use crate::transactions::TransactionType;
use rust_decimal_macros::dec;

fn kinds(warnings: &[LedgerWarning]) -> Vec<WarningKind> {
    warnings.iter().map(|w| w.kind).collect()
}

/// Drops a record behind the engine's back, as a hand-edited bundle would.
fn remove_tx(state: &mut LedgerState, pid: &str, ticker: &str, t: TransactionType) {
    let tx_id = first_of_type(state, pid, ticker, t).id;
    state
        .find_portfolio_mut(pid)
        .unwrap()
        .assets
        .iter_mut()
        .find(|a| a.ticker == ticker)
        .unwrap()
        .remove_transaction(&tx_id);
}

/// 2 BTC bought at 100 and 200, all of it swapped for 10 ETH worth 300,
/// then 5 ETH swapped for SOL worth 500.
fn realized_ledger() -> (LedgerState, String) {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(1), dec!(100), 1);
    let state = buy(&state, &pid, "BTC", dec!(1), dec!(200), 2);
    let state = swap(&state, &pid, "BTC", dec!(2), "ETH", dec!(10), dec!(30), 3);
    let state = swap(&state, &pid, "ETH", dec!(5), "SOL", dec!(50), dec!(10), 4);
    (state, pid)
}

#[test]
fn test_engine_built_ledger_audits_clean() {
    let (state, main) = new_ledger();
    let (state, cold) = with_portfolio(&state, "Cold storage");
    let state = buy(&state, &main, "BTC", dec!(2), dec!(100), 1);
    let state = swap(&state, &main, "BTC", dec!(1), "ETH", dec!(10), dec!(30), 2);
    let state = transfer(&state, &main, "ETH", &cold, dec!(4), 3);
    let state = withdraw(&state, &cold, "ETH", dec!(1), 4);

    assert!(audit(&state).is_empty());
}

#[test]
fn test_audit_reports_drift_without_repairing() {
    let (state, pid) = new_ledger();
    let mut state = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    state.find_portfolio_mut(&pid).unwrap().assets[0].quantity = dec!(5);

    let warnings = audit(&state);
    assert_eq!(kinds(&warnings), vec![WarningKind::AggregateDrift]);
    assert_eq!(warnings[0].ticker.as_deref(), Some("BTC"));
    assert_eq!(warnings[0].portfolio_id.as_deref(), Some(pid.as_str()));
    assert_eq!(asset(&state, &pid, "BTC").quantity, dec!(5));
}

#[test]
fn test_audit_flags_empty_position() {
    let json = r#"{ "assets": [ { "ticker": "DOGE", "transactions": [
        { "type": "BUY", "quantity": 5, "pricePerCoin": 1, "date": "2023-01-01" },
        { "type": "WITHDRAWAL", "quantity": 5, "totalCost": 5, "date": "2023-01-02" } ] } ] }"#;
    let state = import_bundle(json).unwrap().state;

    assert_eq!(kinds(&audit(&state)), vec![WarningKind::ZeroQuantityAsset]);
}

#[test]
fn test_audit_flags_sale_missing_under_its_purchase() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    let mut state = swap(&state, &pid, "BTC", dec!(1), "ETH", dec!(10), dec!(30), 2);
    remove_tx(&mut state, &pid, "BTC", TransactionType::Sell);

    let found = kinds(&audit(&state));
    assert!(found.contains(&WarningKind::DanglingPairLink));
    assert!(found.contains(&WarningKind::OrphanedClosedPositions));
    assert_eq!(found.len(), 2);
}

#[test]
fn test_sale_may_outlive_its_purchase() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    let mut state = swap(&state, &pid, "BTC", dec!(1), "ETH", dec!(10), dec!(30), 2);
    state
        .find_portfolio_mut(&pid)
        .unwrap()
        .assets
        .retain(|a| a.ticker != "ETH");

    assert!(audit(&state).is_empty());
}

#[test]
fn test_audit_flags_copy_whose_transfer_is_gone() {
    let (state, main) = new_ledger();
    let (state, cold) = with_portfolio(&state, "Cold storage");
    let state = buy(&state, &main, "ETH", dec!(10), dec!(50), 1);
    let mut state = transfer(&state, &main, "ETH", &cold, dec!(4), 2);
    remove_tx(&mut state, &main, "ETH", TransactionType::Transfer);

    let warnings = audit(&state);
    assert_eq!(kinds(&warnings), vec![WarningKind::DanglingTransferCopy]);
    assert_eq!(warnings[0].portfolio_id.as_deref(), Some(cold.as_str()));
}

#[test]
fn test_realized_summary_groups_by_ticker() {
    let (state, pid) = realized_ledger();
    let summary = realized_summary(portfolio(&state, &pid), &settings());
    assert_eq!(summary.portfolio_id, pid);
    assert_eq!(summary.currency, "USD");

    let btc = &summary.by_ticker["BTC"];
    assert_eq!(btc.positions, 2);
    assert_eq!(btc.quantity, dec!(2));
    assert_eq!(btc.cost_basis, dec!(300));
    assert_eq!(btc.proceeds, dec!(300));
    assert_eq!(btc.realized_pnl, dec!(0));

    let eth = &summary.by_ticker["ETH"];
    assert_eq!(eth.positions, 1);
    assert_eq!(eth.cost_basis, dec!(150));
    assert_eq!(eth.proceeds, dec!(500));
    assert_eq!(eth.realized_pnl, dec!(350));

    assert_eq!(summary.total_realized_pnl, dec!(350));
    assert!(!summary.by_ticker.contains_key("SOL"));
}

#[test]
fn test_realized_summary_converts_to_display_currency() {
    let (state, pid) = realized_ledger();
    let eur = settings().with_display_currency("eur");
    let summary = realized_summary(portfolio(&state, &pid), &eur);

    assert_eq!(summary.currency, "EUR");
    assert_eq!(summary.by_ticker["ETH"].realized_pnl, dec!(315));
    assert_eq!(summary.total_realized_pnl, dec!(315));
}

#[test]
fn test_realized_summary_of_untraded_portfolio_is_empty() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(1), dec!(100), 1);
    let summary = realized_summary(portfolio(&state, &pid), &settings());
    assert!(summary.by_ticker.is_empty());
    assert_eq!(summary.total_realized_pnl, dec!(0));
}
