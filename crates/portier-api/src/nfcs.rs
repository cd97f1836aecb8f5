//! Handler for `DELETE /nfcs/unassign/:account_id`.

use axum::{
  Json,
  extract::{Path, State},
};
use portier_core::store::AccessStore;
use serde::Serialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct UnassignResponse {
  pub account_id:        Uuid,
  /// Whether an open occupancy record was deleted along with the card.
  pub occupancy_cleared: bool,
}

/// `DELETE /nfcs/unassign/:account_id` — clear the account's card uid and
/// delete any open occupancy record, so a reissued card starts from a clean
/// state. 404 if the account does not exist.
pub async fn unassign<S>(
  State(state): State<ApiState<S>>,
  Path(account_id): Path<Uuid>,
) -> Result<Json<UnassignResponse>, ApiError>
where
  S: AccessStore,
{
  let account = state
    .store
    .get_account(account_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("account {account_id} not found")))?;

  state
    .store
    .set_account_card(account.account_id, None)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  let occupancy_cleared = state
    .store
    .clear_occupancy(account.account_id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  tracing::info!(account = %account_id, occupancy_cleared, "card unassigned");
  Ok(Json(UnassignResponse { account_id, occupancy_cleared }))
}
