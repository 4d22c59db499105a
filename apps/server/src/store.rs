use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lotfolio_core::errors::{Error, Result};
use lotfolio_core::persistence::{import_bundle, ExportBundle, LedgerStoreTrait};
use lotfolio_core::LedgerState;

/// Keeps the ledger as an export bundle in one JSON file.
///
/// Writes go to a sibling temp file that is then renamed over the target, so
/// a crash mid-write leaves the previous bundle intact.
pub struct JsonFileLedgerStore {
    path: PathBuf,
}

impl JsonFileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "ledger.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl LedgerStoreTrait for JsonFileLedgerStore {
    async fn load(&self) -> Result<Option<LedgerState>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let report = import_bundle(&raw)?;
        for warning in &report.warnings {
            tracing::warn!("Ledger file {}: {}", self.path.display(), warning);
        }
        Ok(Some(report.state))
    }

    async fn save(&self, state: &LedgerState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = ExportBundle::from_state(state).to_json()?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| Error::Storage(format!("Failed to replace {}: {}", self.path.display(), e)))?;
        tracing::debug!("Saved ledger to {}", self.path.display());
        Ok(())
    }
}
