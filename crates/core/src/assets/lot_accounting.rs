use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::QUANTITY_THRESHOLD;
use crate::transactions::Transaction;

pub fn is_quantity_significant(quantity: &Decimal) -> bool {
    let threshold =
        Decimal::from_str_radix(QUANTITY_THRESHOLD, 10).unwrap_or_else(|_| Decimal::new(1, 8));
    quantity.abs() >= threshold
}

/// Derived aggregates of one asset.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LotAggregates {
    pub quantity: Decimal,
    pub total_cost_basis: Decimal,
    pub avg_buy_price: Decimal,
}

/// Recomputes an asset's aggregates from its full transaction list.
///
/// `quantity = Σ acquisitions − Σ disposals` and likewise for cost. Order of
/// `transactions` is irrelevant. Every mutation path finishes through here.
pub fn recompute(transactions: &[Transaction]) -> LotAggregates {
    let (mut acquired_qty, mut acquired_cost) = (Decimal::ZERO, Decimal::ZERO);
    let (mut disposed_qty, mut disposed_cost) = (Decimal::ZERO, Decimal::ZERO);

    for tx in transactions {
        if tx.is_acquisition() {
            acquired_qty += tx.quantity;
            acquired_cost += tx.total_cost;
        } else {
            disposed_qty += tx.quantity;
            disposed_cost += tx.total_cost;
        }
    }

    let quantity = acquired_qty - disposed_qty;
    let total_cost_basis = acquired_cost - disposed_cost;
    let avg_buy_price = if quantity > Decimal::ZERO {
        total_cost_basis / quantity
    } else {
        Decimal::ZERO
    };

    LotAggregates {
        quantity,
        total_cost_basis,
        avg_buy_price,
    }
}
