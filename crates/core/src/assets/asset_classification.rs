//! Ticker classification.
//!
//! Spending a cash-like asset in a swap is not a disposal for P&L purposes, so
//! the boundary of "cash" is kept here as one testable function.

/// ISO 4217 codes treated as fiat cash.
const FIAT_CODES: [&str; 24] = [
    "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "NZD", "SEK", "NOK", "DKK", "PLN", "CZK",
    "HUF", "CNY", "HKD", "SGD", "KRW", "INR", "BRL", "MXN", "ZAR", "TRY", "ILS",
];

/// Fiat-pegged tokens treated as cash.
const STABLECOINS: [&str; 11] = [
    "USDT", "USDC", "DAI", "BUSD", "TUSD", "USDP", "FDUSD", "PYUSD", "GUSD", "USDE", "EURC",
];

const CASH_PREFIX: &str = "CASH:";

/// Symbol before any space or parenthesised qualifier, upper-cased.
/// `"ETH (Ledger)"` → `"ETH"`, `" btc "` → `"BTC"`.
pub fn base_symbol(ticker: &str) -> String {
    let trimmed = ticker.trim();
    let end = trimmed
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(trimmed.len());
    trimmed[..end].to_uppercase()
}

/// Whether two tickers name the same instrument once qualifiers are dropped.
pub fn same_symbol(a: &str, b: &str) -> bool {
    base_symbol(a) == base_symbol(b)
}

/// Whether a ticker is fiat, a stablecoin, or an explicit `CASH:` holding.
pub fn is_cash_like(ticker: &str) -> bool {
    let base = base_symbol(ticker);
    if base.starts_with(CASH_PREFIX) {
        return true;
    }
    FIAT_CODES.contains(&base.as_str()) || STABLECOINS.contains(&base.as_str())
}
