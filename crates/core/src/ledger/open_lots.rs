use log::debug;
use rust_decimal::Decimal;

use crate::assets::is_quantity_significant;
use crate::transactions::Transaction;

/// What is left of one acquisition after earlier disposals.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenLot<'a> {
    pub lot: &'a Transaction,
    pub remaining_quantity: Decimal,
    pub remaining_cost: Decimal,
}

impl<'a> OpenLot<'a> {
    fn new(lot: &'a Transaction) -> Self {
        OpenLot {
            lot,
            remaining_quantity: lot.quantity,
            remaining_cost: lot.total_cost,
        }
    }

    /// Prorated native cost of taking `quantity` from what remains.
    pub fn cost_of(&self, quantity: Decimal) -> Decimal {
        if quantity >= self.remaining_quantity {
            self.remaining_cost
        } else if self.remaining_quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.remaining_cost * quantity / self.remaining_quantity
        }
    }

    fn take(&mut self, quantity: Decimal) -> Decimal {
        let cost = self.cost_of(quantity);
        self.remaining_quantity -= quantity;
        self.remaining_cost -= cost;
        cost
    }
}

/// Acquisitions in FIFO order: by date, then creation sequence. The sort is
/// stable so list order only decides between records with equal keys.
pub fn acquisitions_fifo(transactions: &[Transaction]) -> Vec<&Transaction> {
    let mut lots: Vec<&Transaction> = transactions.iter().filter(|tx| tx.is_acquisition()).collect();
    lots.sort_by_key(|tx| tx.fifo_key());
    lots
}

/// Replays every recorded disposal against the acquisitions and returns the
/// lots that still hold quantity, oldest first.
pub fn open_lots(transactions: &[Transaction]) -> Vec<OpenLot<'_>> {
    open_lots_excluding(transactions, None)
}

/// Same as [`open_lots`] but ignoring one disposal, as if it had never been recorded.
pub fn open_lots_excluding<'a>(
    transactions: &'a [Transaction],
    excluded_disposal_id: Option<&str>,
) -> Vec<OpenLot<'a>> {
    let mut lots: Vec<OpenLot<'a>> = acquisitions_fifo(transactions)
        .into_iter()
        .map(OpenLot::new)
        .collect();

    let mut disposals: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| tx.is_disposal())
        .filter(|tx| Some(tx.id.as_str()) != excluded_disposal_id)
        .collect();
    disposals.sort_by_key(|tx| tx.fifo_key());

    for disposal in disposals {
        let unmatched = consume(&mut lots, disposal.quantity);
        if is_quantity_significant(&unmatched) {
            debug!(
                "Disposal {} left {} unmatched while replaying open lots",
                disposal.id, unmatched
            );
        }
    }

    lots.retain(|l| is_quantity_significant(&l.remaining_quantity));
    lots
}

/// Takes `quantity` from the lots oldest-first. Returns what could not be matched.
fn consume(lots: &mut [OpenLot<'_>], quantity: Decimal) -> Decimal {
    let mut remaining = quantity;
    for lot in lots.iter_mut() {
        if !is_quantity_significant(&remaining) {
            break;
        }
        if !is_quantity_significant(&lot.remaining_quantity) {
            continue;
        }
        let taken = remaining.min(lot.remaining_quantity);
        lot.take(taken);
        remaining -= taken;
    }
    remaining.max(Decimal::ZERO)
}
