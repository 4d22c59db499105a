//! FX (Foreign Exchange) module - rate snapshots, conversion, and the rate provider seam.

pub mod currency_converter;
mod fx_errors;
mod fx_model;
mod fx_traits;

pub use currency_converter::{convert_amount, convert_or_passthrough};
pub use fx_errors::FxError;
pub use fx_model::RateSnapshot;
pub use fx_traits::{FxRateProviderTrait, StaticFxRateProvider};
