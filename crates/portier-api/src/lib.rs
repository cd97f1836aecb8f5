//! JSON REST API for Portier.
//!
//! Exposes an axum [`Router`] backed by any
//! [`portier_core::store::AccessStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", portier_api::api_router(state))
//! ```

pub mod dashboard;
pub mod error;
pub mod nfcs;
pub mod taps;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use portier_core::store::AccessStore;
use portier_engine::TapProcessor;

pub use error::ApiError;

/// Shared handler state: the tap processor plus direct store access for the
/// administrative and dashboard endpoints.
pub struct ApiState<S> {
  pub processor: Arc<TapProcessor<S>>,
  pub store:     Arc<S>,
}

// Derived Clone would demand S: Clone.
impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      processor: self.processor.clone(),
      store:     self.store.clone(),
    }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: AccessStore + 'static,
{
  Router::new()
    // Tap ingestion
    .route("/taps", post(taps::ingest::<S>))
    // Card administration
    .route("/nfcs/unassign/{account_id}", delete(nfcs::unassign::<S>))
    // Dashboard
    .route("/dashboard/occupancy", get(dashboard::occupancy::<S>))
    .route("/dashboard/summary", get(dashboard::summary::<S>))
    .route("/dashboard/history", get(dashboard::history::<S>))
    .with_state(state)
}
