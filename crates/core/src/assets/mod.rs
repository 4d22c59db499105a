//! Assets module - positions, lot accounting primitives, and ticker classification.

mod asset_classification;
mod assets_model;
mod lot_accounting;


pub use asset_classification::{base_symbol, is_cash_like, same_symbol};
pub use assets_model::Asset;
pub use lot_accounting::{is_quantity_significant, recompute, LotAggregates};
