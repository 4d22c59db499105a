use super::ledger_model::*;
use super::reversal_engine::{delete_transaction, plan_transaction_deletion, remove_transferred_lots};
use super::test_fixtures::*;
use crate::constants::{RESTORATION_DEPOSIT_SOURCE, RESTORATION_TAG};
use crate::portfolio::LedgerState;
use crate::transactions::TransactionType;
use rust_decimal_macros::dec;

fn delete(state: &LedgerState, pid: &str, ticker: &str, t: TransactionType, confirmed: bool) -> LedgerOutcome {
    let asset_id = asset(state, pid, ticker).id.clone();
    let tx = first_of_type(state, pid, ticker, t);
    delete_transaction(state, pid, &asset_id, &tx.id, confirmed, &settings())
}

fn rejection(outcome: LedgerOutcome) -> ValidationResult {
    match outcome {
        LedgerOutcome::Rejected(result) => result,
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[test]
fn test_deleting_only_buy_removes_asset_without_confirmation() {
    let (empty, pid) = new_ledger();
    let state = buy(&empty, &pid, "BTC", dec!(1), dec!(100), 1);
    let restored = expect_applied(delete(&state, &pid, "BTC", TransactionType::Buy, false));
    assert_eq!(restored, empty);
}

#[test]
fn test_deleting_consumed_buy_is_rejected() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(1), dec!(100), 1);
    let state = buy(&state, &pid, "BTC", dec!(1), dec!(200), 2);
    let state = withdraw(&state, &pid, "BTC", dec!(1.5), 3);

    let result = rejection(delete(&state, &pid, "BTC", TransactionType::Buy, true));
    assert!(matches!(
        result.failure,
        Some(ValidationFailure::InsufficientBalance { .. })
    ));
}

#[test]
fn test_deleting_withdrawal_gives_quantity_back() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(10), dec!(100), 1);
    let before = state.clone();
    let state = withdraw(&state, &pid, "BTC", dec!(4), 2);

    let restored = expect_applied(delete(&state, &pid, "BTC", TransactionType::Withdrawal, false));
    assert_eq!(restored, before);
}

#[test]
fn test_linked_pair_deletion_needs_confirmation_then_reverses_swap() {
    let (state, pid) = new_ledger();
    let before = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    let state = swap(&before, &pid, "BTC", dec!(1), "ETH", dec!(10), dec!(30), 2);

    let plan = match delete(&state, &pid, "BTC", TransactionType::Sell, false) {
        LedgerOutcome::NeedsConfirmation(plan) => plan,
        other => panic!("expected confirmation request, got {:?}", other),
    };
    assert!(plan
        .effects
        .iter()
        .any(|e| matches!(e, LedgerEffect::PurgeClosedPositions { count: 1, .. })));
    assert_eq!(
        plan.effects
            .iter()
            .filter(|e| matches!(e, LedgerEffect::RemoveTransaction { .. }))
            .count(),
        2
    );
    assert!(plan.explanation().contains("ETH"));

    let restored = expect_applied(delete(&state, &pid, "BTC", TransactionType::Sell, true));
    assert_eq!(restored, before);
}

#[test]
fn test_pair_can_be_reversed_from_the_buy_side() {
    let (state, pid) = new_ledger();
    let before = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    let state = swap(&before, &pid, "BTC", dec!(1), "ETH", dec!(10), dec!(30), 2);

    let restored = expect_applied(delete(&state, &pid, "ETH", TransactionType::Buy, true));
    assert_eq!(restored, before);
}

#[test]
fn test_spent_proceeds_block_pair_deletion() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    let state = swap(&state, &pid, "BTC", dec!(1), "ETH", dec!(10), dec!(30), 2);
    let state = withdraw(&state, &pid, "ETH", dec!(5), 3);

    let result = rejection(delete(&state, &pid, "BTC", TransactionType::Sell, true));
    assert!(matches!(
        result.failure,
        Some(ValidationFailure::ProceedsConsumed { ref ticker }) if ticker == "ETH"
    ));
}

#[test]
fn test_pair_whose_lot_was_swapped_onward_is_rejected_with_chain() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    let state = swap(&state, &pid, "BTC", dec!(1), "ETH", dec!(20), dec!(5), 2);
    let state = deposit(&state, &pid, "ETH", dec!(10), dec!(5), 3);
    let state = swap(&state, &pid, "ETH", dec!(5), "SOL", dec!(50), dec!(0.5), 4);

    for side in [("ETH", TransactionType::Buy), ("BTC", TransactionType::Sell)] {
        let result = rejection(delete(&state, &pid, side.0, side.1, true));
        assert!(matches!(
            result.failure,
            Some(ValidationFailure::DownstreamChain { ref ticker }) if ticker == "BTC"
        ));
        let chain = result.chain;
        assert_eq!(chain.len(), 2);
        assert_eq!((chain[0].source_ticker.as_str(), chain[0].proceeds_ticker.as_str()), ("ETH", "SOL"));
        assert_eq!((chain[1].source_ticker.as_str(), chain[1].proceeds_ticker.as_str()), ("BTC", "ETH"));
    }
    assert_eq!(portfolio(&state, &pid).closed_positions.len(), 2);
}

#[test]
fn test_pair_whose_lot_was_withdrawn_is_rejected() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(1), dec!(100), 1);
    let state = swap(&state, &pid, "BTC", dec!(1), "ETH", dec!(20), dec!(5), 2);
    let state = deposit(&state, &pid, "ETH", dec!(10), dec!(5), 3);
    let state = withdraw(&state, &pid, "ETH", dec!(5), 4);

    let result = rejection(delete(&state, &pid, "ETH", TransactionType::Buy, true));
    assert!(matches!(
        result.failure,
        Some(ValidationFailure::ProceedsConsumed { ref ticker }) if ticker == "ETH"
    ));
}

#[test]
fn test_pair_with_untouched_lot_still_reverses_after_later_deposit() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(1), dec!(100), 1);
    let state = swap(&state, &pid, "BTC", dec!(1), "ETH", dec!(20), dec!(5), 2);
    let state = deposit(&state, &pid, "ETH", dec!(10), dec!(5), 3);

    let restored = expect_applied(delete(&state, &pid, "ETH", TransactionType::Buy, true));
    assert_eq!(asset(&restored, &pid, "ETH").quantity, dec!(10));
    assert_eq!(asset(&restored, &pid, "BTC").quantity, dec!(1));
}

#[test]
fn test_reversing_swap_recreates_removed_source_lots() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(1), dec!(100), 1);
    let original_lot = first_of_type(&state, &pid, "BTC", TransactionType::Buy);
    let state = swap(&state, &pid, "BTC", dec!(1), "ETH", dec!(5), dec!(40), 2);
    assert!(!has_asset(&state, &pid, "BTC"));

    let outcome = delete(&state, &pid, "ETH", TransactionType::Buy, true);
    let change = outcome.change().expect("applied");
    assert!(change
        .effects
        .iter()
        .any(|e| matches!(e, LedgerEffect::RestoreLots { .. })));

    let restored = &change.state;
    let btc = asset(restored, &pid, "BTC");
    assert_eq!(btc.quantity, dec!(1));
    assert_eq!(btc.total_cost_basis, dec!(100));
    assert_eq!(btc.transactions[0].id, original_lot.id);
    assert_eq!(btc.transactions[0].sequence, original_lot.sequence);
    assert!(!has_asset(restored, &pid, "ETH"));
    assert!(portfolio(restored, &pid).closed_positions.is_empty());
}

#[test]
fn test_reversing_cash_swap_restores_a_deposit() {
    let (state, pid) = new_ledger();
    let state = deposit(&state, &pid, "USDT", dec!(500), dec!(1), 1);
    let state = swap(&state, &pid, "USDT", dec!(500), "SOL", dec!(5), dec!(100), 2);
    assert!(!has_asset(&state, &pid, "USDT"));

    let restored = expect_applied(delete(&state, &pid, "SOL", TransactionType::Buy, true));
    let usdt = asset(&restored, &pid, "USDT");
    assert_eq!(usdt.quantity, dec!(500));
    assert_eq!(usdt.total_cost_basis, dec!(500));
    let restoration = &usdt.transactions[0];
    assert_eq!(restoration.transaction_type, TransactionType::Deposit);
    assert_eq!(restoration.tag, RESTORATION_TAG);
    assert_eq!(restoration.deposit_source.as_deref(), Some(RESTORATION_DEPOSIT_SOURCE));
    assert!(!has_asset(&restored, &pid, "SOL"));
}

#[test]
fn test_legacy_buy_reverses_matching_unlinked_sale() {
    let (state, pid) = new_ledger();
    let before = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    let mut state = swap(&before, &pid, "BTC", dec!(1), "ETH", dec!(10), dec!(30), 2);
    unlink_pairs(&mut state, &pid);

    let restored = expect_applied(delete(&state, &pid, "ETH", TransactionType::Buy, true));
    assert!(!has_asset(&restored, &pid, "ETH"));
    assert_eq!(asset(&restored, &pid, "BTC").quantity, dec!(2));
    assert!(portfolio(&restored, &pid).closed_positions.is_empty());
}

#[test]
fn test_legacy_buy_with_siblings_is_rejected() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    let mut state = swap(&state, &pid, "BTC", dec!(1), "ETH", dec!(10), dec!(30), 2);
    unlink_pairs(&mut state, &pid);
    let state = buy(&state, &pid, "ETH", dec!(1), dec!(30), 3);

    let result = rejection(delete(&state, &pid, "ETH", TransactionType::Buy, true));
    assert!(matches!(
        result.failure,
        Some(ValidationFailure::PositionHasOtherTransactions { .. })
    ));
}

/// Drops pair links, as bundles written before pairs were recorded have none.
fn unlink_pairs(state: &mut LedgerState, pid: &str) {
    for tx in state
        .find_portfolio_mut(pid)
        .unwrap()
        .assets
        .iter_mut()
        .flat_map(|a| a.transactions.iter_mut())
    {
        tx.linked_buy_sell_transaction_id = None;
        tx.transaction_pair_id = None;
    }
}

/// Swaps 1 of 2 BTC into 10 ETH, then leaves the ETH as a plain `received` entry.
fn sale_with_proceeds_as(received: TransactionType) -> (LedgerState, String) {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(2), dec!(100), 1);
    let mut state = swap(&state, &pid, "BTC", dec!(1), "ETH", dec!(10), dec!(30), 2);
    unlink_pairs(&mut state, &pid);
    let eth = state
        .find_portfolio_mut(&pid)
        .unwrap()
        .assets
        .iter_mut()
        .find(|a| a.ticker == "ETH")
        .unwrap();
    for tx in eth.transactions.iter_mut() {
        tx.transaction_type = received;
        tx.source_ticker = None;
        tx.source_quantity = None;
    }
    (state, pid)
}

#[test]
fn test_deposit_of_sale_proceeds_reverses_the_sale() {
    let (state, pid) = sale_with_proceeds_as(TransactionType::Deposit);
    assert_eq!(portfolio(&state, &pid).closed_positions.len(), 1);

    assert!(matches!(
        delete(&state, &pid, "ETH", TransactionType::Deposit, false),
        LedgerOutcome::NeedsConfirmation(_)
    ));
    let restored = expect_applied(delete(&state, &pid, "ETH", TransactionType::Deposit, true));
    assert!(!has_asset(&restored, &pid, "ETH"));
    let btc = asset(&restored, &pid, "BTC");
    assert_eq!(btc.quantity, dec!(2));
    assert_eq!(btc.total_cost_basis, dec!(200));
    assert!(portfolio(&restored, &pid).closed_positions.is_empty());
}

#[test]
fn test_income_of_sale_proceeds_with_siblings_is_rejected() {
    let (state, pid) = sale_with_proceeds_as(TransactionType::Income);
    let state = deposit(&state, &pid, "ETH", dec!(1), dec!(30), 3);

    let result = rejection(delete(&state, &pid, "ETH", TransactionType::Income, true));
    assert!(matches!(
        result.failure,
        Some(ValidationFailure::PositionHasOtherTransactions { ref ticker }) if ticker == "ETH"
    ));
}

#[test]
fn test_deposit_not_matching_a_sale_is_removed_alone() {
    let (state, pid) = sale_with_proceeds_as(TransactionType::Deposit);
    let state = deposit(&state, &pid, "ETH", dec!(3), dec!(30), 2);
    let extra = asset(&state, &pid, "ETH")
        .transactions
        .iter()
        .find(|tx| tx.quantity == dec!(3))
        .cloned()
        .unwrap();
    let eth_id = asset(&state, &pid, "ETH").id.clone();

    let restored = expect_applied(delete_transaction(&state, &pid, &eth_id, &extra.id, false, &settings()));
    assert_eq!(asset(&restored, &pid, "ETH").quantity, dec!(10));
    assert_eq!(asset(&restored, &pid, "BTC").quantity, dec!(1));
}

#[test]
fn test_transfer_reversal_returns_lots_to_source() {
    let (state, main) = new_ledger();
    let (state, cold) = with_portfolio(&state, "Cold storage");
    let state = buy(&state, &main, "ETH", dec!(10), dec!(50), 1);
    let state = transfer(&state, &main, "ETH", &cold, dec!(4), 2);

    assert!(matches!(
        delete(&state, &main, "ETH", TransactionType::Transfer, false),
        LedgerOutcome::NeedsConfirmation(_)
    ));
    let restored = expect_applied(delete(&state, &main, "ETH", TransactionType::Transfer, true));
    assert!(!has_asset(&restored, &cold, "ETH"));
    let eth = asset(&restored, &main, "ETH");
    assert_eq!(eth.quantity, dec!(10));
    assert_eq!(eth.total_cost_basis, dec!(500));
}

#[test]
fn test_transfer_reversal_needs_destination_to_still_hold_lots() {
    let (state, main) = new_ledger();
    let (state, cold) = with_portfolio(&state, "Cold storage");
    let state = buy(&state, &main, "ETH", dec!(10), dec!(50), 1);
    let state = transfer(&state, &main, "ETH", &cold, dec!(4), 2);
    let state = withdraw(&state, &cold, "ETH", dec!(3), 3);

    let result = rejection(delete(&state, &main, "ETH", TransactionType::Transfer, true));
    assert!(matches!(
        result.failure,
        Some(ValidationFailure::DestinationShortfall { .. })
    ));
}

#[test]
fn test_transfer_copy_redirects_to_source() {
    let (state, main) = new_ledger();
    let (state, cold) = with_portfolio(&state, "Cold storage");
    let state = buy(&state, &main, "ETH", dec!(10), dec!(50), 1);
    let state = transfer(&state, &main, "ETH", &cold, dec!(4), 2);

    let result = rejection(delete(&state, &cold, "ETH", TransactionType::Buy, true));
    match result.failure {
        Some(ValidationFailure::TransferCopy {
            source_portfolio_id, ..
        }) => assert_eq!(source_portfolio_id, main),
        other => panic!("expected transfer copy failure, got {:?}", other),
    }
}

#[test]
fn test_orphaned_copy_deletion_rebuilds_source() {
    let (state, main) = new_ledger();
    let (state, cold) = with_portfolio(&state, "Cold storage");
    let state = buy(&state, &main, "ETH", dec!(10), dec!(50), 1);
    let state = transfer(&state, &main, "ETH", &cold, dec!(10), 2);
    assert!(!has_asset(&state, &main, "ETH"));

    let cold_eth = asset(&state, &cold, "ETH");
    let plan = plan_transaction_deletion(&state, &cold, &cold_eth.id, &cold_eth.transactions[0].id, &settings());
    assert!(plan.validation.valid);
    assert!(plan.requires_confirmation);
    assert!(plan
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::OrphanedTransfer));

    let restored = expect_applied(delete(&state, &cold, "ETH", TransactionType::Buy, true));
    assert!(!has_asset(&restored, &cold, "ETH"));
    let eth = asset(&restored, &main, "ETH");
    assert_eq!(eth.quantity, dec!(10));
    assert_eq!(eth.total_cost_basis, dec!(500));
    assert!(eth.transactions.iter().all(|tx| !tx.is_transfer_copy()));
}

#[test]
fn test_stale_target_is_no_op() {
    let (state, pid) = new_ledger();
    let state = buy(&state, &pid, "BTC", dec!(1), dec!(100), 1);
    let asset_id = asset(&state, &pid, "BTC").id.clone();
    let outcome = delete_transaction(&state, &pid, &asset_id, "gone", true, &settings());
    assert!(matches!(outcome, LedgerOutcome::NoOp { .. }));
}

#[test]
fn test_transferred_lot_removal_prefers_matching_transfer_and_splits() {
    let (state, main) = new_ledger();
    let (state, cold) = with_portfolio(&state, "Cold storage");
    let state = buy(&state, &main, "ETH", dec!(10), dec!(50), 1);
    let state = transfer(&state, &main, "ETH", &cold, dec!(4), 2);
    let state = buy(&state, &cold, "ETH", dec!(1), dec!(80), 3);
    let transfer_id = first_of_type(&state, &main, "ETH", TransactionType::Transfer).id;

    let mut cold_eth = asset(&state, &cold, "ETH").clone();
    let unmatched = remove_transferred_lots(&mut cold_eth, dec!(3), &transfer_id, &main);
    assert_eq!(unmatched, dec!(0));
    assert_eq!(cold_eth.quantity, dec!(2));
    // The 80-dollar lot bought in place is untouched.
    assert_eq!(cold_eth.total_cost_basis, dec!(130));
}
