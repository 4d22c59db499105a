use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::apply_engine::apply_command;
use super::asset_deletion::{delete_asset, plan_asset_deletion};
use super::edit_engine::edit_transaction;
use super::ledger_model::{DeletionPlan, LedgerCommand, LedgerEffect, LedgerOutcome};
use super::reversal_engine::{delete_transaction, plan_transaction_deletion};
use crate::errors::Result;
use crate::fx::{convert_or_passthrough, FxRateProviderTrait, RateSnapshot};
use crate::market_data::{MarketDataProviderTrait, PriceQuote};
use crate::portfolio::LedgerState;
use crate::settings::LedgerSettings;
use crate::transactions::TransactionEdit;

/// Quote lookups keyed by the ticker they were requested for.
pub type QuoteResults = Vec<(String, Result<PriceQuote>)>;

/// Ledger operations with the async collaborators wired in.
///
/// Engine calls stay pure; the service only stamps FX snapshots before a
/// command runs and merges prices after it committed.
#[async_trait]
pub trait LedgerServiceTrait: Send + Sync {
    fn settings(&self) -> &LedgerSettings;

    /// Applies a command, stamping today's rates and pricing any new asset.
    async fn apply(&self, state: &LedgerState, command: LedgerCommand) -> Result<LedgerOutcome>;

    /// Re-prices every held ticker. Failed lookups mark the asset stale.
    async fn refresh_prices(&self, state: &LedgerState) -> LedgerState {
        let quotes = self.fetch_prices(state).await;
        let mut next = state.clone();
        self.merge_prices(&mut next, quotes);
        next
    }

    /// Looks up every ticker held in `state` without touching it.
    async fn fetch_prices(&self, state: &LedgerState) -> QuoteResults;

    /// Writes quotes onto the assets `state` holds now. Only the price, the
    /// display name and the stale flag change; tickers no longer held are skipped.
    fn merge_prices(&self, state: &mut LedgerState, quotes: QuoteResults);

    fn edit_transaction(
        &self,
        state: &LedgerState,
        portfolio_id: &str,
        asset_id: &str,
        transaction_id: &str,
        edit: &TransactionEdit,
    ) -> Result<LedgerOutcome>;

    fn preview_transaction_deletion(
        &self,
        state: &LedgerState,
        portfolio_id: &str,
        asset_id: &str,
        transaction_id: &str,
    ) -> DeletionPlan;

    fn delete_transaction(
        &self,
        state: &LedgerState,
        portfolio_id: &str,
        asset_id: &str,
        transaction_id: &str,
        confirmed: bool,
    ) -> LedgerOutcome;

    fn preview_asset_deletion(&self, state: &LedgerState, portfolio_id: &str, asset_id: &str) -> DeletionPlan;

    fn delete_asset(
        &self,
        state: &LedgerState,
        portfolio_id: &str,
        asset_id: &str,
        confirmed: bool,
    ) -> LedgerOutcome;
}

pub struct LedgerService {
    market_data: Arc<dyn MarketDataProviderTrait>,
    fx_provider: Arc<dyn FxRateProviderTrait>,
    settings: LedgerSettings,
}

impl LedgerService {
    pub fn new(
        market_data: Arc<dyn MarketDataProviderTrait>,
        fx_provider: Arc<dyn FxRateProviderTrait>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            market_data,
            fx_provider,
            settings,
        }
    }

    /// Rates as of `date`, falling back to the configured map for anything
    /// the provider does not know or when it fails outright.
    async fn rates_for(&self, date: chrono::NaiveDate) -> RateSnapshot {
        match self.fx_provider.fetch_rates_for_date(date).await {
            Ok(rates) => rates.merged_with(&self.settings.fallback_rates),
            Err(e) => {
                warn!("FX rates for {} unavailable ({}); using fallback rates", date, e);
                self.settings.fallback_rates.clone()
            }
        }
    }

    async fn fetch_quotes(&self, tickers: &BTreeSet<String>) -> QuoteResults {
        let lookups = tickers.iter().map(|ticker| async move {
            let quote = self.market_data.fetch_quote(ticker).await;
            (ticker.clone(), quote)
        });
        join_all(lookups).await
    }
}

#[async_trait]
impl LedgerServiceTrait for LedgerService {
    fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    async fn apply(&self, state: &LedgerState, mut command: LedgerCommand) -> Result<LedgerOutcome> {
        let date = command.date();
        if let Some(slot) = command.exchange_rates_mut() {
            if slot.is_none() {
                *slot = Some(self.rates_for(date).await);
            }
        }

        let mut change = match apply_command(state, &command, &self.settings)? {
            LedgerOutcome::Applied(change) => change,
            other => return Ok(other),
        };

        let created: BTreeSet<String> = change
            .effects
            .iter()
            .filter_map(|effect| match effect {
                LedgerEffect::CreateAsset { ticker, .. } => Some(ticker.clone()),
                _ => None,
            })
            .collect();
        if !created.is_empty() {
            debug!("Pricing {} new asset(s)", created.len());
            let quotes = self.fetch_quotes(&created).await;
            self.merge_prices(&mut change.state, quotes);
        }
        Ok(LedgerOutcome::Applied(change))
    }

    async fn fetch_prices(&self, state: &LedgerState) -> QuoteResults {
        let tickers: BTreeSet<String> = state
            .portfolios
            .iter()
            .flat_map(|p| p.assets.iter())
            .map(|a| a.ticker.to_uppercase())
            .collect();
        debug!("Refreshing prices for {} ticker(s)", tickers.len());
        self.fetch_quotes(&tickers).await
    }

    fn merge_prices(&self, state: &mut LedgerState, quotes: QuoteResults) {
        for (ticker, quote) in quotes {
            let assets = state
                .portfolios
                .iter_mut()
                .flat_map(|p| p.assets.iter_mut())
                .filter(|a| a.matches_ticker(&ticker));
            match &quote {
                Ok(quote) => {
                    for asset in assets {
                        asset.current_price = convert_or_passthrough(
                            quote.price,
                            &quote.currency,
                            &asset.currency,
                            None,
                            &self.settings.fallback_rates,
                        );
                        if asset.name == asset.ticker {
                            if let Some(name) = quote.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
                                asset.name = name.to_string();
                            }
                        }
                        asset.price_stale = false;
                        asset.price_error = None;
                    }
                }
                Err(e) => {
                    warn!("Price lookup for {} failed: {}. Keeping last known price.", ticker, e);
                    for asset in assets {
                        asset.price_stale = true;
                        asset.price_error = Some(e.to_string());
                    }
                }
            }
        }
    }

    fn edit_transaction(
        &self,
        state: &LedgerState,
        portfolio_id: &str,
        asset_id: &str,
        transaction_id: &str,
        edit: &TransactionEdit,
    ) -> Result<LedgerOutcome> {
        edit_transaction(state, portfolio_id, asset_id, transaction_id, edit, &self.settings)
    }

    fn preview_transaction_deletion(
        &self,
        state: &LedgerState,
        portfolio_id: &str,
        asset_id: &str,
        transaction_id: &str,
    ) -> DeletionPlan {
        plan_transaction_deletion(state, portfolio_id, asset_id, transaction_id, &self.settings)
    }

    fn delete_transaction(
        &self,
        state: &LedgerState,
        portfolio_id: &str,
        asset_id: &str,
        transaction_id: &str,
        confirmed: bool,
    ) -> LedgerOutcome {
        delete_transaction(state, portfolio_id, asset_id, transaction_id, confirmed, &self.settings)
    }

    fn preview_asset_deletion(&self, state: &LedgerState, portfolio_id: &str, asset_id: &str) -> DeletionPlan {
        plan_asset_deletion(state, portfolio_id, asset_id, &self.settings)
    }

    fn delete_asset(
        &self,
        state: &LedgerState,
        portfolio_id: &str,
        asset_id: &str,
        confirmed: bool,
    ) -> LedgerOutcome {
        delete_asset(state, portfolio_id, asset_id, confirmed, &self.settings)
    }
}
