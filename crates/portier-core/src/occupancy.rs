//! Occupancy — the single authoritative "account X is currently inside gate
//! Y" record.
//!
//! At most one record exists per account at any instant; the store enforces
//! this with a uniqueness constraint and applies every transition inside one
//! transaction. Occupancy is the only mutable, short-lived entity in the
//! model: created on entry, deleted on exit or card unassignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Denormalized names frozen when the record is created, for fast read-side
/// rendering. Never re-synchronized if the source entities later change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancySnapshot {
  pub account_name: String,
  pub gate_name:    String,
  pub company_name: String,
  pub card_uid:     String,
}

/// The current-location row for one account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancyRecord {
  pub account_id: Uuid,
  pub gate_id:    Uuid,
  pub snapshot:   OccupancySnapshot,
  pub entered_at: DateTime<Utc>,
}

/// What a successful tap did to the occupancy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum TransitionEffect {
  /// No record existed; one was created at the tapped gate.
  Entered,
  /// A record existed at the tapped gate; it was deleted.
  Exited,
  /// A record existed at a different gate; it was replaced (relocation
  /// policy permitting).
  Relocated { from_gate_id: Uuid },
}

/// How to treat a tap while the account occupies a *different* gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelocationPolicy {
  /// Exit the stale occupancy and enter the tapped gate in one transition.
  /// Readers miss exit taps often enough that strict pairing strands
  /// accounts inside stale records.
  #[default]
  Relocate,
  /// Deny the tap; the account must exit through its original gate first.
  Deny,
}
