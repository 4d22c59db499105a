//! Ledger settings passed explicitly into every operation that converts currency.

mod settings_model;

pub use settings_model::LedgerSettings;
