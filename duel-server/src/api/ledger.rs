use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use duel_core::processors::ConfirmationError;
use duel_sdk::objects::{ConfirmationReceipt, LedgerConfirmation};
use kanau::processor::Processor;

use super::error_response;
use crate::api::extractors::SignedBody;
use crate::state::AppState;

/// `POST /ledger/confirmations`: on-chain progress from the ledger bridge.
///
/// Accepts a signed `LedgerConfirmation`: `match_created` records the
/// external reference, `staked` counts as a stake confirmation.
pub(super) async fn confirm(
    State(state): State<AppState>,
    SignedBody(confirmation): SignedBody<LedgerConfirmation>,
) -> Result<Json<ConfirmationReceipt>, LedgerApiError> {
    let receipt = state
        .coordinator
        .process(confirmation)
        .await
        .map_err(LedgerApiError)?;
    Ok(Json(receipt))
}

#[derive(Debug)]
pub(super) struct LedgerApiError(ConfirmationError);

impl IntoResponse for LedgerApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ConfirmationError::Unavailable(_) => {
                tracing::error!("Ledger API: coordinator unavailable");
                StatusCode::SERVICE_UNAVAILABLE
            }
            ConfirmationError::Rejected(e) => {
                tracing::warn!(error = %e, "Ledger confirmation rejected");
                StatusCode::CONFLICT
            }
        };
        error_response(status, self.0.code(), self.0.to_string())
    }
}
