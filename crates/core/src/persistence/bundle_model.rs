use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::BUNDLE_VERSION;
use crate::errors::Result;
use crate::ledger::LedgerWarning;
use crate::market_data::PriceSnapshot;
use crate::portfolio::{LedgerState, Portfolio};

/// Everything the ledger persists, as written by export.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub portfolios: Vec<Portfolio>,
    #[serde(default)]
    pub price_snapshots: BTreeMap<String, PriceSnapshot>,
}

impl ExportBundle {
    pub fn from_state(state: &LedgerState) -> Self {
        ExportBundle {
            version: BUNDLE_VERSION,
            exported_at: Utc::now(),
            portfolios: state.portfolios.clone(),
            price_snapshots: state.price_snapshots.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn into_state(self) -> LedgerState {
        LedgerState {
            portfolios: self.portfolios,
            price_snapshots: self.price_snapshots,
        }
    }
}

/// Which input shape an import was read from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundleShape {
    Current,
    LegacySinglePortfolio,
}

/// Result of reading a bundle: the migrated state plus anything that was repaired on the way.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub shape: BundleShape,
    pub state: LedgerState,
    pub warnings: Vec<LedgerWarning>,
}
