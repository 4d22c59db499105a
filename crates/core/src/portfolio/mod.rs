//! Portfolio module - portfolios, closed positions, and the whole ledger state.

mod closed_positions_model;
mod portfolio_model;

pub use closed_positions_model::{ClosedPosition, RealizedSummary, TickerRealized};
pub use portfolio_model::{LedgerState, Portfolio};
