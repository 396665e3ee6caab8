use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use duel_core::processors::{CoordinatorUnavailable, GetMatch, GetStats};
use duel_sdk::objects::{ErrorCode, MatchView, StatsResponse};
use kanau::processor::Processor;
use uuid::Uuid;

use super::error_response;
use crate::state::AppState;

/// `GET /stats`: queue depths per stake and match counts.
pub(super) async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, QueryApiError> {
    let stats = state.coordinator.process(GetStats).await?;
    Ok(Json(stats))
}

/// `GET /matches/{match_id}`: one match, 404 once evicted.
pub(super) async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<MatchView>, QueryApiError> {
    state
        .coordinator
        .process(GetMatch { match_id })
        .await?
        .map(Json)
        .ok_or(QueryApiError::NotFound(match_id))
}

#[derive(Debug)]
pub(super) enum QueryApiError {
    Unavailable,
    NotFound(Uuid),
}

impl From<CoordinatorUnavailable> for QueryApiError {
    fn from(_: CoordinatorUnavailable) -> Self {
        Self::Unavailable
    }
}

impl IntoResponse for QueryApiError {
    fn into_response(self) -> Response {
        match self {
            QueryApiError::Unavailable => {
                tracing::error!("Query API: coordinator unavailable");
                error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorCode::CoordinatorUnavailable,
                    "coordinator unavailable",
                )
            }
            QueryApiError::NotFound(match_id) => error_response(
                StatusCode::NOT_FOUND,
                ErrorCode::UnknownMatch,
                format!("match {match_id} not found"),
            ),
        }
    }
}
