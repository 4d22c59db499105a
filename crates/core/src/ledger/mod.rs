//! Ledger module - FIFO resolution, chain tracking, and the apply/edit/reverse engines.

mod apply_engine;
mod asset_deletion;
pub mod chain_tracker;
mod edit_engine;
pub mod fifo_resolver;
mod ledger_model;
mod ledger_service;
pub mod open_lots;
mod portfolio_ops;
mod reports;
mod reversal_engine;
pub mod validation;

pub use apply_engine::{apply_acquisition, apply_command, apply_swap, apply_transfer, apply_withdrawal};
pub use asset_deletion::{delete_asset, plan_asset_deletion};
pub use chain_tracker::{find_chain, find_chain_from, ChainLink};
pub use edit_engine::edit_transaction;
pub use fifo_resolver::{build_closed_positions, resolve_fifo, DisposalContext, FifoResolution, LotConsumption};
pub use ledger_model::*;
pub use ledger_service::{LedgerService, LedgerServiceTrait, QuoteResults};
pub use open_lots::{open_lots, OpenLot};
pub use portfolio_ops::{create_portfolio, delete_portfolio, rename_portfolio};
pub use reports::{audit, realized_summary};
pub use reversal_engine::{delete_transaction, execute_plan, plan_transaction_deletion, resolve_plan};

#[cfg(test)]
pub(crate) mod test_fixtures;



#[cfg(test)]
mod reversal_engine_tests;




#[cfg(test)]
mod reports_tests;
