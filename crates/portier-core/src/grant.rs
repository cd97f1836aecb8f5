//! Grant sources — the assignments an account's gate access derives from.
//!
//! A grant is never stored as such; it is the union, computed at tap time, of
//! three many-to-many sources: static employee-gate assignments, gates
//! attached to a visit the account is a guest of, and gates attached to a
//! specific guest within a visit. Visit-based sources only count while `now`
//! falls inside `[visit_date, valid_until]`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scheduled visit with a validity window. Guests and gates attach via
/// assignment rows held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
  pub visit_id:    Uuid,
  pub company_id:  Uuid,
  pub purpose:     Option<String>,
  pub visit_date:  DateTime<Utc>,
  pub valid_until: DateTime<Utc>,
}

impl Visit {
  /// Whether `now` falls inside the visit's validity window (inclusive).
  pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
    self.visit_date <= now && now <= self.valid_until
  }
}

/// Input to [`crate::store::AccessStore::add_visit`].
#[derive(Debug, Clone)]
pub struct NewVisit {
  pub company_id:  Uuid,
  pub purpose:     Option<String>,
  pub visit_date:  DateTime<Utc>,
  pub valid_until: DateTime<Utc>,
}

/// One currently-granted gate, as resolved by
/// [`crate::store::AccessStore::granted_gates`]. Carries the hardware id so
/// the reader-facing access list needs no second lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateGrant {
  pub gate_id:     Uuid,
  pub hardware_id: i64,
}
