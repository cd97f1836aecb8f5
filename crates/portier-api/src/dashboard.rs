//! Handlers for `/dashboard` read endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/dashboard/occupancy` | Live headcount per gate + who is inside |
//! | `GET`  | `/dashboard/summary` | Today's success counts by account kind |
//! | `GET`  | `/dashboard/history` | Optional `?limit=N`, default 50, cap 500 |

use axum::{
  Json,
  extract::{Query, State},
};
use portier_core::{
  history::HistoryRecord,
  occupancy::OccupancyRecord,
  store::{AccessStore, GateHeadcount, KindCount},
};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError};

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 500;

// ─── Occupancy ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct OccupancyView {
  pub gates:  Vec<GateHeadcount>,
  pub inside: Vec<OccupancyRecord>,
}

/// `GET /dashboard/occupancy`
pub async fn occupancy<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<OccupancyView>, ApiError>
where
  S: AccessStore,
{
  let gates = state
    .store
    .occupancy_by_gate()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  let inside = state
    .store
    .list_occupancy()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(OccupancyView { gates, inside }))
}

// ─── Summary ──────────────────────────────────────────────────────────────────

/// `GET /dashboard/summary` — successful taps during the current UTC day,
/// grouped by account kind.
pub async fn summary<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<KindCount>>, ApiError>
where
  S: AccessStore,
{
  let counts = state
    .store
    .success_counts_today(chrono::Utc::now())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(counts))
}

// ─── History ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
  pub limit: Option<u32>,
}

/// `GET /dashboard/history[?limit=N]`
pub async fn history<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryRecord>>, ApiError>
where
  S: AccessStore,
{
  let limit = params
    .limit
    .unwrap_or(DEFAULT_HISTORY_LIMIT)
    .min(MAX_HISTORY_LIMIT);
  let records = state
    .store
    .recent_history(limit)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(records))
}
