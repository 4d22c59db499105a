/// Transaction types
///
/// Acquisitions add quantity and cost basis to an asset, disposals remove them.

/// Purchase of an asset, either paid from outside the ledger or funded by a linked SELL.
pub const TRANSACTION_TYPE_BUY: &str = "BUY";

/// Disposal of an asset in exchange for another one. Carries the proceeds ticker.
pub const TRANSACTION_TYPE_SELL: &str = "SELL";

/// External funds entering the ledger. Not a disposal anywhere.
pub const TRANSACTION_TYPE_DEPOSIT: &str = "DEPOSIT";

/// Quantity leaving the ledger. Cost basis removed FIFO, no realized P&L.
pub const TRANSACTION_TYPE_WITHDRAWAL: &str = "WITHDRAWAL";

/// Quantity moved to another portfolio. Lots travel with their cost basis.
pub const TRANSACTION_TYPE_TRANSFER: &str = "TRANSFER";

/// Staking rewards, interest, airdrops. Acquisition with zero or supplied cost basis.
pub const TRANSACTION_TYPE_INCOME: &str = "INCOME";

/// Types that add lots to an asset.
pub const ACQUISITION_TYPES: [&str; 3] = [
    TRANSACTION_TYPE_BUY,
    TRANSACTION_TYPE_DEPOSIT,
    TRANSACTION_TYPE_INCOME,
];

/// Types that consume lots of an asset.
pub const DISPOSAL_TYPES: [&str; 3] = [
    TRANSACTION_TYPE_SELL,
    TRANSACTION_TYPE_WITHDRAWAL,
    TRANSACTION_TYPE_TRANSFER,
];

pub fn is_acquisition_type(transaction_type: &str) -> bool {
    ACQUISITION_TYPES.contains(&transaction_type)
}

pub fn is_disposal_type(transaction_type: &str) -> bool {
    DISPOSAL_TYPES.contains(&transaction_type)
}
