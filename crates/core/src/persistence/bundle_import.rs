//! Reading exported bundles back into a [`LedgerState`].
//!
//! Two input shapes are accepted: the current multi-portfolio bundle and the
//! legacy single-portfolio document (`{ assets, closedPositions? }`). Both are
//! parsed leniently and normalised the same way, so older exports that lack
//! ids, tags, currencies, creation timestamps or sequences still load.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use super::bundle_model::{BundleShape, ImportReport};
use crate::assets::Asset;
use crate::constants::{DEFAULT_CURRENCY, DEFAULT_TAG};
use crate::errors::{Error, Result, ValidationError};
use crate::fx::RateSnapshot;
use crate::ledger::{LedgerWarning, WarningKind};
use crate::market_data::PriceSnapshot;
use crate::portfolio::{ClosedPosition, LedgerState, Portfolio};
use crate::transactions::{Transaction, TransactionType};

const LEGACY_PORTFOLIO_NAME: &str = "Imported portfolio";

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBundle {
    Current(RawCurrentBundle),
    Legacy(RawPortfolio),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCurrentBundle {
    portfolios: Vec<RawPortfolio>,
    #[serde(default)]
    price_snapshots: BTreeMap<String, PriceSnapshot>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPortfolio {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    assets: Vec<RawAsset>,
    #[serde(default)]
    closed_positions: Vec<RawClosedPosition>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAsset {
    #[serde(default)]
    id: Option<String>,
    ticker: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    current_price: Option<Decimal>,
    #[serde(default)]
    price_stale: bool,
    #[serde(default)]
    price_error: Option<String>,
    #[serde(default)]
    transactions: Vec<RawTransaction>,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    quantity: Option<Decimal>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    transaction_type: String,
    #[serde(deserialize_with = "decimal_input::deserialize_decimal")]
    quantity: Decimal,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    price_per_coin: Option<Decimal>,
    date: String,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    total_cost: Option<Decimal>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    sequence: Option<u64>,
    #[serde(default)]
    purchase_currency: Option<String>,
    #[serde(default)]
    exchange_rate_at_purchase: Option<RateSnapshot>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    source_ticker: Option<String>,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    source_quantity: Option<Decimal>,
    #[serde(default)]
    proceeds_currency: Option<String>,
    #[serde(default)]
    destination_ticker: Option<String>,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    destination_quantity: Option<Decimal>,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    proceeds: Option<Decimal>,
    #[serde(default)]
    linked_buy_sell_transaction_id: Option<String>,
    #[serde(default)]
    transaction_pair_id: Option<String>,
    #[serde(default)]
    destination_portfolio_id: Option<String>,
    #[serde(default)]
    deposit_source: Option<String>,
    #[serde(default)]
    withdrawal_destination: Option<String>,
    #[serde(default)]
    income_type: Option<String>,
    #[serde(default)]
    income_source: Option<String>,
    #[serde(default)]
    transferred_from: Option<String>,
    #[serde(default)]
    transfer_transaction_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClosedPosition {
    #[serde(default)]
    id: Option<String>,
    ticker: String,
    #[serde(default)]
    sell_transaction_id: Option<String>,
    #[serde(default)]
    buy_transaction_id: Option<String>,

    entry_date: String,
    #[serde(deserialize_with = "decimal_input::deserialize_decimal")]
    entry_price: Decimal,
    #[serde(deserialize_with = "decimal_input::deserialize_decimal")]
    entry_quantity: Decimal,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    entry_cost_basis: Option<Decimal>,
    #[serde(default)]
    entry_currency: Option<String>,
    #[serde(default)]
    entry_tag: Option<String>,
    #[serde(default)]
    entry_type: Option<String>,
    #[serde(default)]
    entry_sequence: Option<u64>,
    #[serde(default)]
    entry_created_at: Option<String>,
    #[serde(default)]
    entry_exchange_rates: Option<RateSnapshot>,

    exit_date: String,
    #[serde(deserialize_with = "decimal_input::deserialize_decimal")]
    exit_price: Decimal,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    exit_quantity: Option<Decimal>,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    exit_proceeds: Option<Decimal>,
    #[serde(default)]
    exit_currency: Option<String>,
    #[serde(default)]
    exit_tag: Option<String>,
    #[serde(default)]
    proceeds_ticker: Option<String>,

    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    cost_basis_display: Option<Decimal>,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    proceeds_display: Option<Decimal>,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    realized_pnl: Option<Decimal>,
    #[serde(default, deserialize_with = "decimal_input::deserialize_option_decimal")]
    realized_pnl_percent: Option<Decimal>,
    #[serde(default)]
    pnl_currency: Option<String>,
    #[serde(default)]
    holding_period_days: Option<i64>,
    #[serde(default)]
    closed_at: Option<String>,
}

// Accepts decimals written as JSON numbers or strings.
mod decimal_input {
    use rust_decimal::Decimal;
    use serde::{self, Deserialize, Deserializer};
    use serde_json::Number;
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DecimalInput {
        String(String),
        Number(Number),
        Null,
    }

    fn parse_decimal_value(value: &str) -> Result<Decimal, String> {
        let trimmed = value.trim();
        Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|e| format!("Invalid decimal value '{}': {}", value, e))
    }

    pub fn deserialize_option_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<DecimalInput>::deserialize(deserializer)? {
            None | Some(DecimalInput::Null) => Ok(None),
            Some(DecimalInput::String(s)) if s.trim().is_empty() => Ok(None),
            Some(DecimalInput::String(s)) => parse_decimal_value(&s).map(Some).map_err(serde::de::Error::custom),
            Some(DecimalInput::Number(n)) => parse_decimal_value(&n.to_string())
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }

    pub fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_option_decimal(deserializer)?
            .ok_or_else(|| serde::de::Error::custom("decimal value is required"))
    }
}

/// Parses a bundle in either accepted shape and migrates it to the current model.
///
/// Aggregates are always recomputed from the transactions; stored values that
/// disagree are reported as drift warnings rather than trusted.
pub fn import_bundle(json: &str) -> Result<ImportReport> {
    let raw: RawBundle = serde_json::from_str(json)
        .map_err(|e| Error::Import(format!("Unrecognised bundle: {}", e)))?;

    let mut warnings = Vec::new();
    let mut sequencer = Sequencer::default();
    let (shape, raw_portfolios, price_snapshots) = match raw {
        RawBundle::Current(bundle) => (BundleShape::Current, bundle.portfolios, bundle.price_snapshots),
        RawBundle::Legacy(portfolio) => {
            info!("Migrating legacy single-portfolio bundle");
            (BundleShape::LegacySinglePortfolio, vec![portfolio], BTreeMap::new())
        }
    };
    sequencer.seed(&raw_portfolios);

    let portfolios = raw_portfolios
        .into_iter()
        .map(|raw| normalize_portfolio(raw, &mut sequencer, &mut warnings))
        .collect::<Result<Vec<_>>>()?;

    let price_snapshots = price_snapshots
        .into_iter()
        .map(|(ticker, snapshot)| (ticker.trim().to_uppercase(), snapshot))
        .collect();

    debug!(
        "Imported {} portfolio(s) with {} warning(s)",
        portfolios.len(),
        warnings.len()
    );
    Ok(ImportReport {
        shape,
        state: LedgerState {
            portfolios,
            price_snapshots,
        },
        warnings,
    })
}

/// Hands out sequences in array order after the highest one already present.
#[derive(Default)]
struct Sequencer {
    next: u64,
}

impl Sequencer {
    fn seed(&mut self, portfolios: &[RawPortfolio]) {
        let from_transactions = portfolios
            .iter()
            .flat_map(|p| p.assets.iter())
            .flat_map(|a| a.transactions.iter())
            .filter_map(|tx| tx.sequence);
        let from_closed = portfolios
            .iter()
            .flat_map(|p| p.closed_positions.iter())
            .filter_map(|cp| cp.entry_sequence);
        self.next = from_transactions.chain(from_closed).max().unwrap_or(0) + 1;
    }

    fn assign(&mut self, existing: Option<u64>) -> u64 {
        match existing {
            Some(sequence) if sequence > 0 => sequence,
            _ => {
                let sequence = self.next;
                self.next += 1;
                sequence
            }
        }
    }
}

fn normalize_portfolio(
    raw: RawPortfolio,
    sequencer: &mut Sequencer,
    warnings: &mut Vec<LedgerWarning>,
) -> Result<Portfolio> {
    let id = non_empty(raw.id).unwrap_or_else(|| Uuid::new_v4().to_string());
    let name = non_empty(raw.name).unwrap_or_else(|| LEGACY_PORTFOLIO_NAME.to_string());
    let created_at = match raw.created_at.as_deref() {
        Some(value) => parse_timestamp(value)?,
        None => Utc::now(),
    };

    let mut assets = Vec::with_capacity(raw.assets.len());
    for raw_asset in raw.assets {
        let asset = normalize_asset(raw_asset, &id, sequencer, warnings)?;
        assets.push(asset);
    }
    let closed_positions = raw
        .closed_positions
        .into_iter()
        .map(|cp| normalize_closed_position(cp, sequencer))
        .collect::<Result<Vec<_>>>()?;

    Ok(Portfolio {
        id,
        name,
        assets,
        closed_positions,
        created_at,
    })
}

fn normalize_asset(
    raw: RawAsset,
    portfolio_id: &str,
    sequencer: &mut Sequencer,
    warnings: &mut Vec<LedgerWarning>,
) -> Result<Asset> {
    if raw.ticker.trim().is_empty() {
        return Err(ValidationError::MissingField("ticker".to_string()).into());
    }
    let currency = non_empty(raw.currency)
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    let mut asset = Asset::new(&raw.ticker, raw.name.as_deref(), &currency);
    if let Some(id) = non_empty(raw.id) {
        asset.id = id;
    }
    asset.current_price = raw.current_price.unwrap_or(Decimal::ZERO);
    asset.price_stale = raw.price_stale;
    asset.price_error = raw.price_error;

    for raw_tx in raw.transactions {
        let tx = normalize_transaction(raw_tx, &currency, sequencer)?;
        asset.transactions.push(tx);
    }
    asset.recalculate_aggregates();

    if let Some(stored) = raw.quantity {
        if stored != asset.quantity {
            warn!(
                "Imported {} stored quantity {} but its transactions sum to {}",
                asset.ticker, stored, asset.quantity
            );
            warnings.push(
                LedgerWarning::new(
                    WarningKind::AggregateDrift,
                    format!(
                        "Stored quantity {} replaced by {} recomputed from transactions",
                        stored.normalize(),
                        asset.quantity.normalize()
                    ),
                )
                .in_portfolio(portfolio_id)
                .for_ticker(&asset.ticker),
            );
        }
    }
    if asset.is_depleted() {
        warnings.push(
            LedgerWarning::new(WarningKind::ZeroQuantityAsset, "Imported position holds nothing")
                .in_portfolio(portfolio_id)
                .for_ticker(&asset.ticker),
        );
    }
    Ok(asset)
}

fn normalize_transaction(raw: RawTransaction, asset_currency: &str, sequencer: &mut Sequencer) -> Result<Transaction> {
    let transaction_type = TransactionType::from_str(&raw.transaction_type)
        .map_err(ValidationError::InvalidInput)?;
    let date = parse_date(&raw.date)?;
    let price_per_coin = raw.price_per_coin.unwrap_or(Decimal::ZERO);
    let total_cost = raw.total_cost.unwrap_or(raw.quantity * price_per_coin);
    let created_at = match raw.created_at.as_deref() {
        Some(value) => parse_timestamp(value)?,
        None => date.and_time(chrono::NaiveTime::MIN).and_utc(),
    };

    Ok(Transaction {
        id: non_empty(raw.id).unwrap_or_else(|| Uuid::new_v4().to_string()),
        transaction_type,
        quantity: raw.quantity,
        price_per_coin,
        date,
        total_cost,
        tag: non_empty(raw.tag).unwrap_or_else(|| DEFAULT_TAG.to_string()),
        created_at,
        sequence: sequencer.assign(raw.sequence),
        purchase_currency: non_empty(raw.purchase_currency)
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| asset_currency.to_string()),
        exchange_rate_at_purchase: raw.exchange_rate_at_purchase,
        notes: non_empty(raw.notes),
        source_ticker: non_empty(raw.source_ticker),
        source_quantity: raw.source_quantity,
        proceeds_currency: non_empty(raw.proceeds_currency),
        destination_ticker: non_empty(raw.destination_ticker),
        destination_quantity: raw.destination_quantity,
        proceeds: raw.proceeds,
        linked_buy_sell_transaction_id: non_empty(raw.linked_buy_sell_transaction_id),
        transaction_pair_id: non_empty(raw.transaction_pair_id),
        destination_portfolio_id: non_empty(raw.destination_portfolio_id),
        deposit_source: non_empty(raw.deposit_source),
        withdrawal_destination: non_empty(raw.withdrawal_destination),
        income_type: non_empty(raw.income_type),
        income_source: non_empty(raw.income_source),
        transferred_from: non_empty(raw.transferred_from),
        transfer_transaction_id: non_empty(raw.transfer_transaction_id),
    })
}

/// Missing totals are derived the way the FIFO resolver would have written
/// them, with the display currency assumed to be the default one.
fn normalize_closed_position(raw: RawClosedPosition, sequencer: &mut Sequencer) -> Result<ClosedPosition> {
    let ticker = raw.ticker.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(ValidationError::MissingField("closedPositions.ticker".to_string()).into());
    }
    let sell_transaction_id = non_empty(raw.sell_transaction_id)
        .ok_or_else(|| ValidationError::MissingField("closedPositions.sellTransactionId".to_string()))?;
    let buy_transaction_id = non_empty(raw.buy_transaction_id)
        .ok_or_else(|| ValidationError::MissingField("closedPositions.buyTransactionId".to_string()))?;
    let entry_type = match non_empty(raw.entry_type) {
        Some(value) => TransactionType::from_str(&value).map_err(ValidationError::InvalidInput)?,
        None => TransactionType::default(),
    };

    let entry_date = parse_date(&raw.entry_date)?;
    let exit_date = parse_date(&raw.exit_date)?;
    let entry_created_at = match raw.entry_created_at.as_deref() {
        Some(value) => parse_timestamp(value)?,
        None => entry_date.and_time(chrono::NaiveTime::MIN).and_utc(),
    };
    let closed_at = match raw.closed_at.as_deref() {
        Some(value) => parse_timestamp(value)?,
        None => exit_date.and_time(chrono::NaiveTime::MIN).and_utc(),
    };

    let exit_quantity = raw.exit_quantity.unwrap_or(raw.entry_quantity);
    let entry_cost_basis = raw
        .entry_cost_basis
        .unwrap_or(raw.entry_quantity * raw.entry_price);
    let exit_proceeds = raw.exit_proceeds.unwrap_or(exit_quantity * raw.exit_price);
    let cost_basis_display = raw.cost_basis_display.unwrap_or(entry_cost_basis);
    let proceeds_display = raw.proceeds_display.unwrap_or(exit_proceeds);
    let realized_pnl = raw.realized_pnl.unwrap_or(proceeds_display - cost_basis_display);
    let realized_pnl_percent = raw.realized_pnl_percent.unwrap_or_else(|| {
        if cost_basis_display > Decimal::ZERO {
            realized_pnl / cost_basis_display * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        }
    });

    Ok(ClosedPosition {
        id: non_empty(raw.id).unwrap_or_else(|| Uuid::new_v4().to_string()),
        ticker,
        sell_transaction_id,
        buy_transaction_id,
        entry_date,
        entry_price: raw.entry_price,
        entry_quantity: raw.entry_quantity,
        entry_cost_basis,
        entry_currency: currency_or_default(raw.entry_currency),
        entry_tag: non_empty(raw.entry_tag).unwrap_or_else(|| DEFAULT_TAG.to_string()),
        entry_type,
        entry_sequence: sequencer.assign(raw.entry_sequence),
        entry_created_at,
        entry_exchange_rates: raw.entry_exchange_rates,
        exit_date,
        exit_price: raw.exit_price,
        exit_quantity,
        exit_proceeds,
        exit_currency: currency_or_default(raw.exit_currency),
        exit_tag: non_empty(raw.exit_tag).unwrap_or_else(|| DEFAULT_TAG.to_string()),
        proceeds_ticker: non_empty(raw.proceeds_ticker).map(|t| t.to_uppercase()),
        cost_basis_display,
        proceeds_display,
        realized_pnl,
        realized_pnl_percent,
        pnl_currency: currency_or_default(raw.pnl_currency),
        holding_period_days: raw
            .holding_period_days
            .unwrap_or_else(|| (exit_date - entry_date).num_days()),
        closed_at,
    })
}

fn currency_or_default(value: Option<String>) -> String {
    non_empty(value)
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// `YYYY-MM-DD`, or a full timestamp whose calendar date is kept.
fn parse_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.date_naive());
    }
    Ok(NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")?.date())
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    Ok(parse_date(trimmed)?.and_time(chrono::NaiveTime::MIN).and_utc())
}
