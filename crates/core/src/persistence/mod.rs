//! Persistence module - export bundles, legacy import and the storage seam.

mod bundle_import;
mod bundle_model;
mod store_traits;

pub use bundle_import::import_bundle;
pub use bundle_model::{BundleShape, ExportBundle, ImportReport};
pub use store_traits::{InMemoryLedgerStore, LedgerStoreTrait};
