//! HTTP and WebSocket API.
//!
//! # Endpoints (under `/api/v1`)
//!
//! - `GET  /play/ws`             – player WebSocket
//! - `GET  /stats`               – queue depths and match counts
//! - `GET  /matches/{match_id}`  – one match snapshot
//! - `POST /ledger/confirmations` – signed on-chain progress from the ledger bridge

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use duel_sdk::objects::{ErrorBody, ErrorCode};

use crate::state::AppState;

pub mod extractors;
mod ledger;
mod play;
mod query;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/play/ws", get(play::play_ws))
        .route("/stats", get(query::get_stats))
        .route("/matches/{match_id}", get(query::get_match))
        .route("/ledger/confirmations", post(ledger::confirm))
}

/// `{code, message}` JSON error response.
fn error_response(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            code,
            message: message.into(),
        }),
    )
        .into_response()
}
