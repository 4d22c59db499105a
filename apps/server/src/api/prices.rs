use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{post, put},
    Json, Router,
};
use chrono::Utc;
use lotfolio_core::constants::DEFAULT_CURRENCY;
use lotfolio_core::market_data::PriceSnapshot;
use lotfolio_core::LedgerState;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceUpdate {
    price: Decimal,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

/// Records a manual price snapshot and re-prices every holding from it.
async fn set_price(
    Path(ticker): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(update): Json<PriceUpdate>,
) -> ApiResult<Json<LedgerState>> {
    if update.price <= Decimal::ZERO {
        return Err(ApiError::BadRequest(format!("Price for {} must be positive", ticker)));
    }
    {
        let mut ledger = state.ledger.lock().await;
        let mut next = ledger.clone();
        next.price_snapshots.insert(
            ticker.trim().to_uppercase(),
            PriceSnapshot {
                price: update.price,
                currency: update
                    .currency
                    .map(|c| c.trim().to_uppercase())
                    .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                display_name: update.display_name,
                fetched_at: Utc::now(),
            },
        );
        state.replace(&mut ledger, next).await?;
    }
    reprice(&state).await.map(Json)
}

async fn refresh_prices(State(state): State<Arc<AppState>>) -> ApiResult<Json<LedgerState>> {
    reprice(&state).await.map(Json)
}

/// Quotes are fetched against a copy so mutations are not held up by the
/// provider. They are merged into whatever the ledger holds once they arrive.
async fn reprice(state: &AppState) -> ApiResult<LedgerState> {
    let held = state.ledger.lock().await.clone();
    let quotes = state.ledger_service.fetch_prices(&held).await;

    let mut ledger = state.ledger.lock().await;
    let mut next = ledger.clone();
    state.ledger_service.merge_prices(&mut next, quotes);
    state.replace(&mut ledger, next).await?;
    Ok(ledger.clone())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/prices/{ticker}", put(set_price))
        .route("/prices/refresh", post(refresh_prices))
}
