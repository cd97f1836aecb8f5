//! Portier server assembly: configuration and router construction.

use std::{path::PathBuf, sync::Arc};

use axum::Router;
use portier_api::ApiState;
use portier_core::{occupancy::RelocationPolicy, store::AccessStore};
use portier_engine::{
  ProcessorConfig, TapProcessor,
  policy::ConsecutiveDenials,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `PORTIER_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  pub store_path:        PathBuf,
  /// What to do when a tap arrives while the account occupies another gate.
  pub relocation_policy: RelocationPolicy,
  pub starting_balance:  i64,
  /// Denial streak length that trips a violation. 0 disables scoring.
  pub denial_threshold:  u32,
  pub denial_points:     i64,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:              "0.0.0.0".into(),
      port:              8080,
      store_path:        PathBuf::from("portier.db"),
      relocation_policy: RelocationPolicy::default(),
      starting_balance:  100,
      denial_threshold:  3,
      denial_points:     5,
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Wire the processor and the API router over `store`.
pub fn router<S>(store: Arc<S>, config: &ServerConfig) -> Router
where
  S: AccessStore + 'static,
{
  let processor = TapProcessor::new(
    store.clone(),
    ProcessorConfig {
      relocation_policy: config.relocation_policy,
      starting_balance:  config.starting_balance,
    },
    Arc::new(ConsecutiveDenials {
      threshold: config.denial_threshold,
      points:    config.denial_points,
    }),
  );

  portier_api::api_router(ApiState {
    processor: Arc::new(processor),
    store,
  })
  .layer(TraceLayer::new_for_http())
}
