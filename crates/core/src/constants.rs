/// Currency assumed when a record does not name one
pub const DEFAULT_CURRENCY: &str = "USD";

/// Tag assigned to transactions that arrive without one (legacy imports)
pub const DEFAULT_TAG: &str = "DCA";

/// Reference currency of every rate snapshot. Rates are units of a currency per 1 USD.
pub const RATE_REFERENCE_CURRENCY: &str = "USD";

/// Decimal precision for valuation calculations
pub const DECIMAL_PRECISION: u32 = 8;

/// Decimal precision for display
pub const DISPLAY_DECIMAL_PRECISION: u32 = 2;

/// Quantity threshold for significant positions
pub const QUANTITY_THRESHOLD: &str = "0.00000001";

/// Provenance label stamped on deposits synthesized to give back a spent source asset
pub const RESTORATION_DEPOSIT_SOURCE: &str = "SWAP_REVERSAL";

/// Tag carried by lots recreated while reversing a swap
pub const RESTORATION_TAG: &str = "RESTORED";

/// Current export bundle schema version
pub const BUNDLE_VERSION: u32 = 2;
