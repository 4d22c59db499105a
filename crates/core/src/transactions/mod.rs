//! Transactions module - the immutable ledger event records and their classification.

mod transactions_constants;
mod transactions_model;

#[cfg(test)]
mod transactions_model_tests;

pub use transactions_constants::*;
pub use transactions_model::{Transaction, TransactionEdit, TransactionType};
