use async_trait::async_trait;
use std::sync::RwLock;

use crate::errors::{Error, Result};
use crate::portfolio::LedgerState;

/// Durable home of the whole ledger. The engine never calls this; hosts load
/// once at startup and save after each applied change.
#[async_trait]
pub trait LedgerStoreTrait: Send + Sync {
    /// `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<LedgerState>>;
    async fn save(&self, state: &LedgerState) -> Result<()>;
}

/// Store that keeps the last saved state in memory.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<Option<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStoreTrait for InMemoryLedgerStore {
    async fn load(&self) -> Result<Option<LedgerState>> {
        let guard = self
            .state
            .read()
            .map_err(|e| Error::Storage(format!("Failed to acquire read lock: {}", e)))?;
        Ok(guard.clone())
    }

    async fn save(&self, state: &LedgerState) -> Result<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|e| Error::Storage(format!("Failed to acquire write lock: {}", e)))?;
        *guard = Some(state.clone());
        Ok(())
    }
}
