use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lotfolio_core::errors::Error as CoreError;
use lotfolio_core::ledger::LedgerOutcome;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Core(#[from] CoreError),
    #[error("Not Found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            ApiError::Core(e) => match e {
                CoreError::Storage(_) | CoreError::Unexpected(_) => {
                    tracing::error!("Internal error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
                CoreError::MarketData(_) | CoreError::Fx(_) => (StatusCode::BAD_GATEWAY, e.to_string()),
                _ => (StatusCode::BAD_REQUEST, e.to_string()),
            },
            ApiError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            ApiError::Anyhow(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: msg,
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Engine outcome as an HTTP response: applied and no-op changes are 200,
/// a pending confirmation is 409 and a rejection is 422.
pub struct OutcomeResponse(pub LedgerOutcome);

impl IntoResponse for OutcomeResponse {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerOutcome::Applied(_) | LedgerOutcome::NoOp { .. } => StatusCode::OK,
            LedgerOutcome::NeedsConfirmation(_) => StatusCode::CONFLICT,
            LedgerOutcome::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(self.0)).into_response()
    }
}
