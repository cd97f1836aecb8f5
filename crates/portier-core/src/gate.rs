//! Gates and locations — the physical checkpoints accounts pass through.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A site that owns one or more gates. Disabling a location disables every
/// gate inside it for authorization purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
  pub location_id: Uuid,
  pub name:        String,
  pub active:      bool,
  pub created_at:  DateTime<Utc>,
}

/// Whether a gate is a fixed installation or a portable reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
  Physical,
  Portable,
}

/// A checkpoint with an attached NFC reader. `hardware_id` is the numeric
/// identifier the reader firmware reports in tap events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
  pub gate_id:     Uuid,
  pub name:        String,
  pub hardware_id: i64,
  pub location_id: Uuid,
  pub kind:        GateKind,
  pub active:      bool,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::AccessStore::add_gate`].
#[derive(Debug, Clone)]
pub struct NewGate {
  pub name:        String,
  pub hardware_id: i64,
  pub location_id: Uuid,
  pub kind:        GateKind,
}
