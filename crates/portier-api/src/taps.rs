//! Handler for `POST /taps` — the reader ingestion endpoint.
//!
//! Always answers `200 OK` with a [`TapResponse`] body; denials (including
//! internal failures) are expressed in the body, never as HTTP errors, so
//! reader firmware has exactly one response shape to parse.

use axum::{Json, extract::State};
use portier_core::{store::AccessStore, tap::{TapEvent, TapResponse}};

use crate::ApiState;

/// `POST /taps` — body: a [`TapEvent`].
pub async fn ingest<S>(
  State(state): State<ApiState<S>>,
  Json(event): Json<TapEvent>,
) -> Json<TapResponse>
where
  S: AccessStore,
{
  Json(state.processor.process(event).await)
}
