use chrono::Utc;
use log::{debug, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::open_lots::open_lots;
use crate::assets::is_quantity_significant;
use crate::fx::convert_or_passthrough;
use crate::portfolio::ClosedPosition;
use crate::settings::LedgerSettings;
use crate::transactions::Transaction;

/// Slice of one lot taken by a disposal.
#[derive(Debug, Clone, PartialEq)]
pub struct LotConsumption {
    pub lot: Transaction,
    pub quantity: Decimal,
    /// Prorated cost in the lot's own purchase currency.
    pub native_cost: Decimal,
    /// Same cost converted to the working currency.
    pub converted_cost: Decimal,
}

/// Result of matching a disposal quantity against open lots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FifoResolution {
    pub requested_quantity: Decimal,
    pub matched_quantity: Decimal,
    pub unmatched_quantity: Decimal,
    /// Cost consumed, each lot converted to the working currency.
    pub cost_basis_consumed: Decimal,
    /// Sum of the raw lot costs, used as the disposal's `total_cost`.
    pub native_cost_consumed: Decimal,
    pub consumptions: Vec<LotConsumption>,
}

impl FifoResolution {
    pub fn has_shortfall(&self) -> bool {
        is_quantity_significant(&self.unmatched_quantity)
    }
}

/// Walks `transactions`' open lots oldest-first and takes `quantity` from them.
///
/// Lots priced in another currency are converted to `working_currency` with the
/// rates stamped on the lot, or the fallback map when the lot carries none.
/// A quantity larger than what is held drains every lot and is reported as
/// `unmatched_quantity`; no consumption is fabricated for it.
pub fn resolve_fifo(
    transactions: &[Transaction],
    quantity: Decimal,
    working_currency: &str,
    settings: &LedgerSettings,
) -> FifoResolution {
    let mut resolution = FifoResolution {
        requested_quantity: quantity,
        ..Default::default()
    };
    let mut remaining = quantity;

    for open in open_lots(transactions) {
        if !is_quantity_significant(&remaining) {
            break;
        }
        let taken = remaining.min(open.remaining_quantity);
        let native_cost = open.cost_of(taken);
        let lot_currency = lot_currency(open.lot, working_currency);
        let converted_cost = convert_or_passthrough(
            native_cost,
            lot_currency,
            working_currency,
            open.lot.exchange_rate_at_purchase.as_ref(),
            &settings.fallback_rates,
        );

        resolution.matched_quantity += taken;
        resolution.native_cost_consumed += native_cost;
        resolution.cost_basis_consumed += converted_cost;
        resolution.consumptions.push(LotConsumption {
            lot: open.lot.clone(),
            quantity: taken,
            native_cost,
            converted_cost,
        });
        remaining -= taken;
    }

    resolution.unmatched_quantity = remaining.max(Decimal::ZERO);
    if resolution.has_shortfall() {
        warn!(
            "FIFO shortfall: requested {} but only {} held; {} left unmatched",
            quantity, resolution.matched_quantity, resolution.unmatched_quantity
        );
    } else {
        debug!(
            "FIFO matched {} across {} lot(s), cost basis {}",
            resolution.matched_quantity,
            resolution.consumptions.len(),
            resolution.cost_basis_consumed
        );
    }
    resolution
}

fn lot_currency<'a>(lot: &'a Transaction, working_currency: &'a str) -> &'a str {
    if lot.purchase_currency.trim().is_empty() {
        working_currency
    } else {
        &lot.purchase_currency
    }
}

/// Disposal side of the closed positions built from a resolution.
#[derive(Debug, Clone, Copy)]
pub struct DisposalContext<'a> {
    pub ticker: &'a str,
    pub sell: &'a Transaction,
    /// Total value received for the whole disposal.
    pub proceeds: Decimal,
    pub proceeds_currency: &'a str,
    pub proceeds_ticker: Option<&'a str>,
}

/// One closed position per consumed lot slice, P&L in the display currency.
pub fn build_closed_positions(
    resolution: &FifoResolution,
    disposal: DisposalContext<'_>,
    settings: &LedgerSettings,
) -> Vec<ClosedPosition> {
    let sell = disposal.sell;
    let exit_price = if sell.quantity.is_zero() {
        Decimal::ZERO
    } else {
        disposal.proceeds / sell.quantity
    };
    let display = settings.display_currency.as_str();
    let closed_at = Utc::now();

    resolution
        .consumptions
        .iter()
        .map(|c| {
            let lot = &c.lot;
            let entry_currency = lot_currency(lot, disposal.proceeds_currency).to_string();
            let exit_proceeds = exit_price * c.quantity;

            let cost_basis_display = convert_or_passthrough(
                c.native_cost,
                &entry_currency,
                display,
                lot.exchange_rate_at_purchase.as_ref(),
                &settings.fallback_rates,
            );
            let proceeds_display = convert_or_passthrough(
                exit_proceeds,
                disposal.proceeds_currency,
                display,
                sell.exchange_rate_at_purchase.as_ref(),
                &settings.fallback_rates,
            );
            let realized_pnl = proceeds_display - cost_basis_display;
            let realized_pnl_percent = if cost_basis_display > Decimal::ZERO {
                realized_pnl / cost_basis_display * Decimal::ONE_HUNDRED
            } else {
                Decimal::ZERO
            };

            ClosedPosition {
                id: Uuid::new_v4().to_string(),
                ticker: disposal.ticker.to_string(),
                sell_transaction_id: sell.id.clone(),
                buy_transaction_id: lot.id.clone(),
                entry_date: lot.date,
                entry_price: lot.price_per_coin,
                entry_quantity: c.quantity,
                entry_cost_basis: c.native_cost,
                entry_currency,
                entry_tag: lot.tag.clone(),
                entry_type: lot.transaction_type,
                entry_sequence: lot.sequence,
                entry_created_at: lot.created_at,
                entry_exchange_rates: lot.exchange_rate_at_purchase.clone(),
                exit_date: sell.date,
                exit_price,
                exit_quantity: c.quantity,
                exit_proceeds,
                exit_currency: disposal.proceeds_currency.to_string(),
                exit_tag: sell.tag.clone(),
                proceeds_ticker: disposal.proceeds_ticker.map(str::to_string),
                cost_basis_display,
                proceeds_display,
                realized_pnl,
                realized_pnl_percent,
                pnl_currency: display.to_string(),
                holding_period_days: (sell.date - lot.date).num_days(),
                closed_at,
            }
        })
        .collect()
}
