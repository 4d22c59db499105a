use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use lotfolio_core::ledger::DeletionPlan;

use super::transactions::Confirmation;
use crate::{
    error::{ApiResult, OutcomeResponse},
    main_lib::AppState,
};

async fn preview_deletion(
    Path((id, asset_id)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
) -> Json<DeletionPlan> {
    let ledger = state.ledger.lock().await;
    Json(state.ledger_service.preview_asset_deletion(&ledger, &id, &asset_id))
}

async fn delete_asset(
    Path((id, asset_id)): Path<(String, String)>,
    Query(query): Query<Confirmation>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<OutcomeResponse> {
    let mut ledger = state.ledger.lock().await;
    let outcome = state
        .ledger_service
        .delete_asset(&ledger, &id, &asset_id, query.confirmed);
    state.commit(&mut ledger, &outcome).await?;
    Ok(OutcomeResponse(outcome))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/portfolios/{id}/assets/{asset_id}", delete(delete_asset))
        .route("/portfolios/{id}/assets/{asset_id}/deletion-plan", get(preview_deletion))
}
