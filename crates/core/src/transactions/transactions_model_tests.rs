use super::*;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::str::FromStr;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

#[test]
fn test_new_derives_total_from_quantity_and_price() {
    let tx = Transaction::new(
        TransactionType::Buy,
        dec!(2.5),
        dec!(400),
        day(3),
        "USD",
        "DCA",
        7,
    );
    assert_eq!(tx.total_cost, dec!(1000));
    assert_eq!(tx.sequence, 7);
    assert!(tx.is_acquisition());
    assert!(!tx.is_linked());
    assert!(!tx.id.is_empty());
}

#[test]
fn test_disposal_carries_cost_basis_as_total() {
    let tx = Transaction::disposal(
        TransactionType::Withdrawal,
        dec!(4),
        dec!(300),
        day(9),
        "USD",
        "Cold storage",
        1,
    );
    assert_eq!(tx.total_cost, dec!(300));
    assert_eq!(tx.price_per_coin, dec!(75));
    assert!(tx.is_disposal());
}

#[test]
fn test_type_round_trips_through_str() {
    for t in [
        TransactionType::Buy,
        TransactionType::Sell,
        TransactionType::Deposit,
        TransactionType::Withdrawal,
        TransactionType::Transfer,
        TransactionType::Income,
    ] {
        assert_eq!(TransactionType::from_str(t.as_str()).unwrap(), t);
    }
    assert_eq!(
        TransactionType::from_str(" withdrawal ").unwrap(),
        TransactionType::Withdrawal
    );
    assert!(TransactionType::from_str("SPLIT").is_err());
}

#[test]
fn test_type_serializes_screaming_case() {
    let tx = Transaction::new(TransactionType::Income, dec!(1), dec!(0), day(1), "USD", "Staking", 0);
    let json = serde_json::to_value(&tx).unwrap();
    assert_eq!(json["type"], "INCOME");
    assert_eq!(json["date"], "2024-01-01");
    assert!(json.get("sourceTicker").is_none());
}

#[test]
fn test_proceeds_ticker_prefers_destination_ticker() {
    let mut tx = Transaction::new(TransactionType::Sell, dec!(1), dec!(1), day(1), "USD", "", 0);
    assert_eq!(tx.proceeds_ticker(), None);
    tx.proceeds_currency = Some("ETH".to_string());
    assert_eq!(tx.proceeds_ticker(), Some("ETH"));
    tx.destination_ticker = Some("ETH (Ledger)".to_string());
    assert_eq!(tx.proceeds_ticker(), Some("ETH (Ledger)"));
}

#[test]
fn test_resize_lot_prorates_cost() {
    let mut tx = Transaction::new(TransactionType::Buy, dec!(10), dec!(20), day(1), "USD", "", 0);
    tx.resize_lot(dec!(4));
    assert_eq!(tx.quantity, dec!(4));
    assert_eq!(tx.total_cost, dec!(80));
    assert_eq!(tx.price_per_coin, dec!(20));
}

#[test]
fn test_edit_derives_price_from_total() {
    let tx = Transaction::new(TransactionType::Buy, dec!(10), dec!(20), day(1), "USD", "", 0);
    let edit = TransactionEdit {
        total_cost: Some(dec!(300)),
        ..Default::default()
    };
    assert!(edit.changes_economics(&tx));
    assert_eq!(edit.derive_amounts(&tx), (dec!(10), dec!(30), dec!(300)));
}

#[test]
fn test_edit_quantity_keeps_price() {
    let tx = Transaction::new(TransactionType::Buy, dec!(10), dec!(20), day(1), "USD", "", 0);
    let edit = TransactionEdit {
        quantity: Some(dec!(5)),
        ..Default::default()
    };
    assert_eq!(edit.derive_amounts(&tx), (dec!(5), dec!(20), dec!(100)));
}

#[test]
fn test_metadata_only_edit_is_not_economic() {
    let mut tx = Transaction::new(TransactionType::Buy, dec!(10), dec!(20), day(1), "USD", "DCA", 0);
    let edit = TransactionEdit {
        tag: Some("Long term".to_string()),
        notes: Some("bought the dip".to_string()),
        quantity: Some(dec!(10)),
        ..Default::default()
    };
    assert!(!edit.changes_economics(&tx));
    edit.apply_metadata(&mut tx);
    assert_eq!(tx.tag, "Long term");
    assert_eq!(tx.notes.as_deref(), Some("bought the dip"));
}
