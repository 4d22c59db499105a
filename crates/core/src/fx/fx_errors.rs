use thiserror::Error;

#[derive(Error, Debug)]
pub enum FxError {
    #[error("No rate for currency {0} in snapshot or fallback map")]
    MissingRate(String),

    #[error("Invalid exchange rate for {currency}: {rate}")]
    InvalidRate { currency: String, rate: String },

    #[error("Rate provider error: {0}")]
    ProviderError(String),
}
