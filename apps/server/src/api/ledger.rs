use std::sync::Arc;

use axum::{extract::State, routing::get, routing::post, Json, Router};
use lotfolio_core::ledger::{audit, LedgerWarning};
use lotfolio_core::persistence::{import_bundle, ExportBundle, ImportReport};
use lotfolio_core::LedgerState;

use crate::{error::ApiResult, main_lib::AppState};

async fn get_ledger(State(state): State<Arc<AppState>>) -> Json<LedgerState> {
    let ledger = state.ledger.lock().await;
    Json(ledger.clone())
}

async fn get_audit(State(state): State<Arc<AppState>>) -> Json<Vec<LedgerWarning>> {
    let ledger = state.ledger.lock().await;
    Json(audit(&ledger))
}

async fn export_ledger(State(state): State<Arc<AppState>>) -> Json<ExportBundle> {
    let ledger = state.ledger.lock().await;
    Json(ExportBundle::from_state(&ledger))
}

/// Replaces the whole ledger with an uploaded bundle in either supported shape.
async fn import_ledger(State(state): State<Arc<AppState>>, body: String) -> ApiResult<Json<ImportReport>> {
    let report = import_bundle(&body)?;
    tracing::info!(
        "Importing {:?} bundle with {} portfolio(s), {} warning(s)",
        report.shape,
        report.state.portfolios.len(),
        report.warnings.len()
    );
    let mut ledger = state.ledger.lock().await;
    state.replace(&mut ledger, report.state.clone()).await?;
    Ok(Json(report))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ledger", get(get_ledger))
        .route("/audit", get(get_audit))
        .route("/export", get(export_ledger))
        .route("/import", post(import_ledger))
}
