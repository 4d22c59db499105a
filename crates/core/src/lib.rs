//! Lotfolio Core - the portfolio transaction ledger and FIFO lot-accounting engine.
//!
//! Every operation is a pure function of a [`LedgerState`] value plus a
//! command; results are new states wrapped in [`ledger::LedgerOutcome`].
//! Price and FX lookups sit behind async traits so hosts can plug in their
//! own providers, and persistence is left to implementors of
//! [`persistence::LedgerStoreTrait`].

pub mod assets;
pub mod constants;
pub mod errors;
pub mod fx;
pub mod ledger;
pub mod market_data;
pub mod persistence;
pub mod portfolio;
pub mod settings;
pub mod transactions;

// Re-export common types from asset and portfolio modules
pub use assets::*;
pub use portfolio::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
