//! Ledger command, outcome, and cascade models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::chain_tracker::ChainLink;
use crate::constants::DEFAULT_CURRENCY;
use crate::fx::RateSnapshot;
use crate::portfolio::{ClosedPosition, LedgerState};
use crate::transactions::{Transaction, TransactionType};

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// BUY paid from outside the ledger, DEPOSIT, or INCOME.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionCommand {
    pub portfolio_id: String,
    pub ticker: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Reference currency of a newly created asset. Defaults to the purchase currency.
    #[serde(default)]
    pub asset_currency: Option<String>,
    pub quantity: Decimal,
    #[serde(default)]
    pub price_per_coin: Decimal,
    pub date: NaiveDate,
    #[serde(default = "default_currency")]
    pub purchase_currency: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub exchange_rates: Option<RateSnapshot>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub deposit_source: Option<String>,
    #[serde(default)]
    pub income_type: Option<String>,
    #[serde(default)]
    pub income_source: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalCommand {
    pub portfolio_id: String,
    pub asset_id: String,
    pub quantity: Decimal,
    pub date: NaiveDate,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub withdrawal_destination: Option<String>,
    #[serde(default)]
    pub exchange_rates: Option<RateSnapshot>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Spend `source_quantity` of one asset to receive `destination_quantity` of another.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwapCommand {
    pub portfolio_id: String,
    pub source_asset_id: String,
    pub source_quantity: Decimal,
    pub destination_ticker: String,
    #[serde(default)]
    pub destination_name: Option<String>,
    #[serde(default)]
    pub destination_currency: Option<String>,
    pub destination_quantity: Decimal,
    /// Unit price of the destination asset in `purchase_currency`.
    pub price_per_coin: Decimal,
    #[serde(default = "default_currency")]
    pub purchase_currency: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub exchange_rates: Option<RateSnapshot>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferCommand {
    pub source_portfolio_id: String,
    pub asset_id: String,
    pub destination_portfolio_id: String,
    pub quantity: Decimal,
    pub date: NaiveDate,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One user action against the ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerCommand {
    Buy(AcquisitionCommand),
    Deposit(AcquisitionCommand),
    Income(AcquisitionCommand),
    Withdrawal(WithdrawalCommand),
    Swap(SwapCommand),
    Transfer(TransferCommand),
}

impl LedgerCommand {
    pub fn date(&self) -> NaiveDate {
        match self {
            LedgerCommand::Buy(c) | LedgerCommand::Deposit(c) | LedgerCommand::Income(c) => c.date,
            LedgerCommand::Withdrawal(c) => c.date,
            LedgerCommand::Swap(c) => c.date,
            LedgerCommand::Transfer(c) => c.date,
        }
    }

    /// Rate snapshot slot, for commands that stamp one on their transactions.
    pub fn exchange_rates_mut(&mut self) -> Option<&mut Option<RateSnapshot>> {
        match self {
            LedgerCommand::Buy(c) | LedgerCommand::Deposit(c) | LedgerCommand::Income(c) => {
                Some(&mut c.exchange_rates)
            }
            LedgerCommand::Withdrawal(c) => Some(&mut c.exchange_rates),
            LedgerCommand::Swap(c) => Some(&mut c.exchange_rates),
            LedgerCommand::Transfer(_) => None,
        }
    }

    /// Portfolio the command acts on; for transfers, the sending one.
    pub fn portfolio_id(&self) -> &str {
        match self {
            LedgerCommand::Buy(c) | LedgerCommand::Deposit(c) | LedgerCommand::Income(c) => &c.portfolio_id,
            LedgerCommand::Withdrawal(c) => &c.portfolio_id,
            LedgerCommand::Swap(c) => &c.portfolio_id,
            LedgerCommand::Transfer(c) => &c.source_portfolio_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LedgerCommand::Buy(_) => "BUY",
            LedgerCommand::Deposit(_) => "DEPOSIT",
            LedgerCommand::Income(_) => "INCOME",
            LedgerCommand::Withdrawal(_) => "WITHDRAWAL",
            LedgerCommand::Swap(_) => "SWAP",
            LedgerCommand::Transfer(_) => "TRANSFER",
        }
    }
}

/// Kinds of data-consistency anomalies the engine survives but reports.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningKind {
    UnmatchedDisposal,
    ProceedsMissing,
    SourceMissing,
    OrphanedTransfer,
    LotReferencedByClosedPositions,
    OrphanedClosedPositions,
    AggregateDrift,
    ZeroQuantityAsset,
    DanglingPairLink,
    DanglingTransferCopy,
    CostMismatch,
    StalePrice,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerWarning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
}

impl LedgerWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        LedgerWarning {
            kind,
            message: message.into(),
            portfolio_id: None,
            ticker: None,
        }
    }

    pub fn in_portfolio(mut self, portfolio_id: &str) -> Self {
        self.portfolio_id = Some(portfolio_id.to_string());
        self
    }

    pub fn for_ticker(mut self, ticker: &str) -> Self {
        self.ticker = Some(ticker.to_string());
        self
    }
}

impl fmt::Display for LedgerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ticker {
            Some(ticker) => write!(f, "[{:?}] {}: {}", self.kind, ticker, self.message),
            None => write!(f, "[{:?}] {}", self.kind, self.message),
        }
    }
}

/// Why a mutation or deletion was declined.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationFailure {
    InsufficientBalance {
        ticker: String,
        requested: Decimal,
        available: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    TransferCopy {
        source_portfolio_id: String,
        transfer_transaction_id: String,
    },
    DestinationShortfall {
        ticker: String,
        required: Decimal,
        available: Decimal,
    },
    DownstreamChain {
        ticker: String,
    },
    ProceedsConsumed {
        ticker: String,
    },
    #[serde(rename_all = "camelCase")]
    DanglingReference {
        reference: String,
    },
    PositionHasOtherTransactions {
        ticker: String,
    },
    UnsupportedEdit {
        transaction_type: TransactionType,
    },
    InvalidTarget,
}

/// Structured pass/fail result of the validation layer. Never an `Err`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ValidationFailure>,
    /// Links to reverse first, most recent hop first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<ChainLink>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        ValidationResult {
            valid: true,
            error: None,
            failure: None,
            chain: Vec::new(),
        }
    }

    pub fn fail(failure: ValidationFailure, error: impl Into<String>) -> Self {
        ValidationResult {
            valid: false,
            error: Some(error.into()),
            failure: Some(failure),
            chain: Vec::new(),
        }
    }

    pub fn with_chain(mut self, chain: Vec<ChainLink>) -> Self {
        self.chain = chain;
        self
    }
}

/// Selects closed positions to purge.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "by", content = "value", rename_all = "camelCase")]
pub enum ClosedPositionSelector {
    SellTransaction(String),
    Ticker(String),
}

impl ClosedPositionSelector {
    pub fn matches(&self, closed: &ClosedPosition) -> bool {
        match self {
            ClosedPositionSelector::SellTransaction(id) => &closed.sell_transaction_id == id,
            ClosedPositionSelector::Ticker(ticker) => closed.ticker.eq_ignore_ascii_case(ticker),
        }
    }
}

/// Acquisition lot given back when the disposal that consumed it is reversed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestoredLot {
    pub buy_transaction_id: String,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub price_per_coin: Decimal,
    pub date: NaiveDate,
    pub tag: String,
    pub currency: String,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_rates: Option<RateSnapshot>,
}

impl From<&ClosedPosition> for RestoredLot {
    fn from(closed: &ClosedPosition) -> Self {
        RestoredLot {
            buy_transaction_id: closed.buy_transaction_id.clone(),
            transaction_type: closed.entry_type,
            quantity: closed.entry_quantity,
            cost_basis: closed.entry_cost_basis,
            price_per_coin: closed.entry_price,
            date: closed.entry_date,
            tag: closed.entry_tag.clone(),
            currency: closed.entry_currency.clone(),
            sequence: closed.entry_sequence,
            created_at: closed.entry_created_at,
            exchange_rates: closed.entry_exchange_rates.clone(),
        }
    }
}

/// One state change, either already applied or planned for a deletion.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "effect", rename_all = "camelCase")]
pub enum LedgerEffect {
    #[serde(rename_all = "camelCase")]
    CreateAsset { portfolio_id: String, ticker: String },
    #[serde(rename_all = "camelCase")]
    CreateTransaction {
        portfolio_id: String,
        ticker: String,
        transaction_id: String,
        transaction_type: TransactionType,
        quantity: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    CreateClosedPositions {
        portfolio_id: String,
        ticker: String,
        count: usize,
        realized_pnl: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    RemoveTransaction {
        portfolio_id: String,
        ticker: String,
        transaction_id: String,
        transaction_type: TransactionType,
        quantity: Decimal,
        date: NaiveDate,
    },
    #[serde(rename_all = "camelCase")]
    RemoveAsset {
        portfolio_id: String,
        asset_id: String,
        ticker: String,
    },
    #[serde(rename_all = "camelCase")]
    PurgeClosedPositions {
        portfolio_id: String,
        selector: ClosedPositionSelector,
        count: usize,
    },
    #[serde(rename_all = "camelCase")]
    RestoreLots {
        portfolio_id: String,
        ticker: String,
        sell_transaction_id: String,
        lots: Vec<RestoredLot>,
    },
    #[serde(rename_all = "camelCase")]
    RestoreSpentSource {
        portfolio_id: String,
        ticker: String,
        quantity: Decimal,
        total_cost: Decimal,
        currency: String,
        date: NaiveDate,
    },
    #[serde(rename_all = "camelCase")]
    RemoveTransferredLots {
        portfolio_id: String,
        ticker: String,
        quantity: Decimal,
        transfer_transaction_id: String,
        source_portfolio_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ReconstructSourceAsset {
        portfolio_id: String,
        ticker: String,
        name: String,
        currency: String,
        lots: Vec<Transaction>,
    },
}

impl LedgerEffect {
    /// Human-readable line for confirmation prompts.
    pub fn describe(&self) -> String {
        match self {
            LedgerEffect::CreateAsset { ticker, .. } => format!("Create position {}", ticker),
            LedgerEffect::CreateTransaction {
                ticker,
                transaction_type,
                quantity,
                ..
            } => format!("Record {} of {} {}", transaction_type, quantity.normalize(), ticker),
            LedgerEffect::CreateClosedPositions {
                ticker,
                count,
                realized_pnl,
                ..
            } => format!(
                "Realize {} closed position(s) on {} (P&L {})",
                count,
                ticker,
                realized_pnl.round_dp(2)
            ),
            LedgerEffect::RemoveTransaction {
                ticker,
                transaction_type,
                quantity,
                date,
                ..
            } => format!(
                "Delete {} of {} {} dated {}",
                transaction_type,
                quantity.normalize(),
                ticker,
                date
            ),
            LedgerEffect::RemoveAsset { ticker, .. } => {
                format!("Delete the whole {} position", ticker)
            }
            LedgerEffect::PurgeClosedPositions {
                selector, count, ..
            } => match selector {
                ClosedPositionSelector::SellTransaction(id) => {
                    format!("Delete {} closed position(s) realized by sale {}", count, id)
                }
                ClosedPositionSelector::Ticker(ticker) => {
                    format!("Delete {} closed position(s) on {}", count, ticker)
                }
            },
            LedgerEffect::RestoreLots { ticker, lots, .. } => {
                let quantity: Decimal = lots.iter().map(|l| l.quantity).sum();
                format!(
                    "Restore {} {} across {} lot(s) consumed by the sale",
                    quantity.normalize(),
                    ticker,
                    lots.len()
                )
            }
            LedgerEffect::RestoreSpentSource {
                ticker, quantity, ..
            } => format!(
                "Give back {} {} spent on the purchase (as a restoration deposit)",
                quantity.normalize(),
                ticker
            ),
            LedgerEffect::RemoveTransferredLots {
                ticker,
                quantity,
                portfolio_id,
                ..
            } => format!(
                "Remove {} transferred {} from portfolio {}",
                quantity.normalize(),
                ticker,
                portfolio_id
            ),
            LedgerEffect::ReconstructSourceAsset {
                ticker,
                lots,
                portfolio_id,
                ..
            } => {
                let quantity: Decimal = lots.iter().map(|l| l.quantity).sum();
                format!(
                    "Rebuild {} {} in portfolio {} from the transferred lots",
                    quantity.normalize(),
                    ticker,
                    portfolio_id
                )
            }
        }
    }
}

/// What a deletion is aimed at.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "target", rename_all = "camelCase")]
pub enum DeletionTarget {
    #[serde(rename_all = "camelCase")]
    Transaction {
        portfolio_id: String,
        asset_id: String,
        transaction_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Asset {
        portfolio_id: String,
        asset_id: String,
    },
}

/// Computed consequences of a deletion, produced without mutating anything.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeletionPlan {
    pub target: DeletionTarget,
    pub validation: ValidationResult,
    pub requires_confirmation: bool,
    pub effects: Vec<LedgerEffect>,
    pub warnings: Vec<LedgerWarning>,
}

impl DeletionPlan {
    pub fn rejected(target: DeletionTarget, validation: ValidationResult) -> Self {
        DeletionPlan {
            target,
            validation,
            requires_confirmation: false,
            effects: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Multi-line explanation of the cascade for a confirmation prompt.
    pub fn explanation(&self) -> String {
        if !self.validation.valid {
            return self.validation.error.clone().unwrap_or_default();
        }
        let mut lines: Vec<String> = self.effects.iter().map(|e| format!("- {}", e.describe())).collect();
        for warning in &self.warnings {
            lines.push(format!("! {}", warning.message));
        }
        lines.join("\n")
    }
}

/// New state produced by a committed mutation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerChange {
    pub state: LedgerState,
    pub effects: Vec<LedgerEffect>,
    pub warnings: Vec<LedgerWarning>,
}

/// Result of every engine entry point.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum LedgerOutcome {
    Applied(LedgerChange),
    NeedsConfirmation(DeletionPlan),
    Rejected(ValidationResult),
    NoOp { reason: String },
}

impl LedgerOutcome {
    pub fn no_op(reason: impl Into<String>) -> Self {
        LedgerOutcome::NoOp {
            reason: reason.into(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, LedgerOutcome::Applied(_))
    }

    pub fn change(&self) -> Option<&LedgerChange> {
        match self {
            LedgerOutcome::Applied(change) => Some(change),
            _ => None,
        }
    }

    pub fn state(&self) -> Option<&LedgerState> {
        self.change().map(|c| &c.state)
    }

    /// The new state when applied, otherwise the untouched prior state.
    pub fn into_state(self, prior: LedgerState) -> LedgerState {
        match self {
            LedgerOutcome::Applied(change) => change.state,
            _ => prior,
        }
    }
}
