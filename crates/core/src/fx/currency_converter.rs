use log::warn;
use rust_decimal::Decimal;

use super::fx_errors::FxError;
use super::fx_model::{normalize_code, RateSnapshot};

/// Converts `amount` between two currencies through the USD-relative rate maps.
///
/// Each side's rate is looked up in the transaction's own `snapshot` first and
/// in the `fallback` map second, so a lot stamped with historical rates keeps
/// converting at those rates even after the live map moves.
pub fn convert_amount(
    amount: Decimal,
    from_currency: &str,
    to_currency: &str,
    snapshot: Option<&RateSnapshot>,
    fallback: &RateSnapshot,
) -> Result<Decimal, FxError> {
    let from = normalize_code(from_currency);
    let to = normalize_code(to_currency);
    if from == to || amount.is_zero() {
        return Ok(amount);
    }

    let lookup = |code: &str| -> Result<Decimal, FxError> {
        snapshot
            .and_then(|s| s.rate(code))
            .or_else(|| fallback.rate(code))
            .ok_or_else(|| FxError::MissingRate(code.to_string()))
    };

    let from_rate = lookup(&from)?;
    let to_rate = lookup(&to)?;
    Ok(amount / from_rate * to_rate)
}

/// Same as [`convert_amount`] but never fails: when no rate is known the
/// amount is returned unconverted and a warning is logged.
pub fn convert_or_passthrough(
    amount: Decimal,
    from_currency: &str,
    to_currency: &str,
    snapshot: Option<&RateSnapshot>,
    fallback: &RateSnapshot,
) -> Decimal {
    match convert_amount(amount, from_currency, to_currency, snapshot, fallback) {
        Ok(converted) => converted,
        Err(e) => {
            warn!(
                "Failed to convert {} {} to {}: {}. Using original unconverted amount.",
                amount, from_currency, to_currency, e
            );
            amount
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fallback() -> RateSnapshot {
        RateSnapshot::reference_only()
            .with_rate("EUR", dec!(0.9))
            .with_rate("GBP", dec!(0.8))
    }

    #[test]
    fn test_same_currency_is_identity() {
        let converted = convert_amount(dec!(123.45), "usd", "USD", None, &fallback()).unwrap();
        assert_eq!(converted, dec!(123.45));
    }

    #[test]
    fn test_converts_through_usd() {
        let converted = convert_amount(dec!(90), "EUR", "GBP", None, &fallback()).unwrap();
        assert_eq!(converted, dec!(80));
    }

    #[test]
    fn test_snapshot_takes_precedence_over_fallback() {
        let snapshot = RateSnapshot::new().with_rate("EUR", dec!(0.5));
        let converted = convert_amount(dec!(100), "USD", "EUR", Some(&snapshot), &fallback()).unwrap();
        assert_eq!(converted, dec!(50));
    }

    #[test]
    fn test_missing_rate_is_an_error() {
        let result = convert_amount(dec!(10), "JPY", "USD", None, &fallback());
        assert!(matches!(result, Err(FxError::MissingRate(code)) if code == "JPY"));
    }

    #[test]
    fn test_passthrough_keeps_amount_when_rate_missing() {
        let converted = convert_or_passthrough(dec!(10), "JPY", "USD", None, &fallback());
        assert_eq!(converted, dec!(10));
    }
}
