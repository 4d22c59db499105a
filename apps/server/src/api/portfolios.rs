use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use lotfolio_core::ledger::{create_portfolio, delete_portfolio, find_chain, realized_summary, rename_portfolio, ChainLink};
use lotfolio_core::RealizedSummary;
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult, OutcomeResponse},
    main_lib::AppState,
};

#[derive(Deserialize)]
struct PortfolioName {
    name: String,
}

async fn create(State(state): State<Arc<AppState>>, Json(body): Json<PortfolioName>) -> ApiResult<OutcomeResponse> {
    let mut ledger = state.ledger.lock().await;
    let (outcome, id) = create_portfolio(&ledger, &body.name)?;
    state.commit(&mut ledger, &outcome).await?;
    tracing::info!("Created portfolio {}", id);
    Ok(OutcomeResponse(outcome))
}

async fn rename(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PortfolioName>,
) -> ApiResult<OutcomeResponse> {
    let mut ledger = state.ledger.lock().await;
    let outcome = rename_portfolio(&ledger, &id, &body.name)?;
    state.commit(&mut ledger, &outcome).await?;
    Ok(OutcomeResponse(outcome))
}

async fn remove(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult<OutcomeResponse> {
    let mut ledger = state.ledger.lock().await;
    let outcome = delete_portfolio(&ledger, &id);
    state.commit(&mut ledger, &outcome).await?;
    Ok(OutcomeResponse(outcome))
}

async fn get_chain(
    Path((id, ticker)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ChainLink>>> {
    let ledger = state.ledger.lock().await;
    let portfolio = ledger.find_portfolio(&id).ok_or(ApiError::NotFound)?;
    Ok(Json(find_chain(&ticker, portfolio)))
}

async fn get_realized(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<RealizedSummary>> {
    let ledger = state.ledger.lock().await;
    let portfolio = ledger.find_portfolio(&id).ok_or(ApiError::NotFound)?;
    Ok(Json(realized_summary(portfolio, state.ledger_service.settings())))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/portfolios", post(create))
        .route("/portfolios/{id}", put(rename).delete(remove))
        .route("/portfolios/{id}/chain/{ticker}", get(get_chain))
        .route("/portfolios/{id}/realized", get(get_realized))
}
