use std::sync::Arc;

use lotfolio_core::fx::StaticFxRateProvider;
use lotfolio_core::ledger::{LedgerOutcome, LedgerService, LedgerServiceTrait};
use lotfolio_core::market_data::SnapshotMarketDataProvider;
use lotfolio_core::persistence::LedgerStoreTrait;
use lotfolio_core::LedgerState;
use tokio::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::error::ApiResult;
use crate::store::JsonFileLedgerStore;

pub struct AppState {
    /// The one in-memory ledger. Every mutation holds this lock from read to
    /// save; price lookups run outside it.
    pub ledger: Mutex<LedgerState>,
    pub ledger_service: Arc<dyn LedgerServiceTrait>,
    pub store: Arc<dyn LedgerStoreTrait>,
    pub market_data: SnapshotMarketDataProvider,
}

impl AppState {
    pub fn new(
        initial: LedgerState,
        ledger_service: Arc<dyn LedgerServiceTrait>,
        store: Arc<dyn LedgerStoreTrait>,
        market_data: SnapshotMarketDataProvider,
    ) -> Self {
        Self {
            ledger: Mutex::new(initial),
            ledger_service,
            store,
            market_data,
        }
    }

    /// Persists an applied outcome and makes it current. Other outcomes leave
    /// the ledger untouched.
    pub async fn commit(&self, ledger: &mut LedgerState, outcome: &LedgerOutcome) -> ApiResult<()> {
        if let Some(next) = outcome.state() {
            self.replace(ledger, next.clone()).await?;
        }
        Ok(())
    }

    pub async fn replace(&self, ledger: &mut LedgerState, next: LedgerState) -> ApiResult<()> {
        self.store.save(&next).await?;
        self.market_data.replace(next.price_snapshots.clone())?;
        *ledger = next;
        Ok(())
    }
}

pub fn init_tracing() {
    let log_format = std::env::var("LOTFOLIO_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let store = Arc::new(JsonFileLedgerStore::new(&config.data_path));
    let initial = store.load().await?.unwrap_or_default();
    tracing::info!(
        "Ledger file in use: {} ({} portfolio(s))",
        store.path().display(),
        initial.portfolios.len()
    );

    let settings = config.ledger_settings();
    let market_data = SnapshotMarketDataProvider::new(initial.price_snapshots.clone());
    let fx_provider = Arc::new(StaticFxRateProvider::new(settings.fallback_rates.clone()));
    let ledger_service: Arc<dyn LedgerServiceTrait> = Arc::new(LedgerService::new(
        Arc::new(market_data.clone()),
        fx_provider,
        settings,
    ));

    Ok(Arc::new(AppState::new(initial, ledger_service, store, market_data)))
}
