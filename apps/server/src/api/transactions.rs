use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use lotfolio_core::ledger::{DeletionPlan, LedgerCommand};
use lotfolio_core::transactions::TransactionEdit;
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult, OutcomeResponse},
    main_lib::AppState,
};

#[derive(Deserialize, Default)]
pub(super) struct Confirmation {
    #[serde(default)]
    pub confirmed: bool,
}

async fn apply_command(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(command): Json<LedgerCommand>,
) -> ApiResult<OutcomeResponse> {
    if command.portfolio_id() != id {
        return Err(ApiError::BadRequest(format!(
            "{} command targets portfolio {}, not {}",
            command.label(),
            command.portfolio_id(),
            id
        )));
    }
    let mut ledger = state.ledger.lock().await;
    let outcome = state.ledger_service.apply(&ledger, command).await?;
    state.commit(&mut ledger, &outcome).await?;
    Ok(OutcomeResponse(outcome))
}

async fn edit_transaction(
    Path((id, asset_id, transaction_id)): Path<(String, String, String)>,
    State(state): State<Arc<AppState>>,
    Json(edit): Json<TransactionEdit>,
) -> ApiResult<OutcomeResponse> {
    let mut ledger = state.ledger.lock().await;
    let outcome = state
        .ledger_service
        .edit_transaction(&ledger, &id, &asset_id, &transaction_id, &edit)?;
    state.commit(&mut ledger, &outcome).await?;
    Ok(OutcomeResponse(outcome))
}

async fn preview_deletion(
    Path((id, asset_id, transaction_id)): Path<(String, String, String)>,
    State(state): State<Arc<AppState>>,
) -> Json<DeletionPlan> {
    let ledger = state.ledger.lock().await;
    Json(
        state
            .ledger_service
            .preview_transaction_deletion(&ledger, &id, &asset_id, &transaction_id),
    )
}

async fn delete_transaction(
    Path((id, asset_id, transaction_id)): Path<(String, String, String)>,
    Query(query): Query<Confirmation>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<OutcomeResponse> {
    let mut ledger = state.ledger.lock().await;
    let outcome = state
        .ledger_service
        .delete_transaction(&ledger, &id, &asset_id, &transaction_id, query.confirmed);
    state.commit(&mut ledger, &outcome).await?;
    Ok(OutcomeResponse(outcome))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/portfolios/{id}/transactions", post(apply_command))
        .route(
            "/portfolios/{id}/assets/{asset_id}/transactions/{transaction_id}",
            put(edit_transaction).delete(delete_transaction),
        )
        .route(
            "/portfolios/{id}/assets/{asset_id}/transactions/{transaction_id}/deletion-plan",
            get(preview_deletion),
        )
}
