//! The logical tap-event contract between gate readers and the core.
//!
//! The wire protocol of the reader hardware is out of scope; this is the
//! shape the core consumes and the structured response every reader receives.
//! A reader never sees an error: every outcome, including storage failure,
//! arrives as a success-or-denied [`TapResponse`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountKind;

/// A single physical presentation of a card at a reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapEvent {
  /// Reader-assigned idempotency key. Readers retransmit on flaky links;
  /// replays of the same key must not re-toggle occupancy. Optional for
  /// legacy readers that assign none.
  pub event_id:        Option<String>,
  pub card_uid:        String,
  /// The numeric gate identifier the reader firmware reports.
  pub gate_identifier: i64,
  pub tapped_at:       DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TapStatus {
  Success,
  Denied,
}

/// Why a tap was denied. Everything here lands in the audit trail as a
/// denied row; nothing is surfaced to the reader as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
  /// The card uid resolved to no active account.
  UnknownCard,
  /// The gate, or the location that owns it, is disabled (also covers an
  /// unrecognised gate identifier).
  GateInactive,
  /// No active grant covers this account/gate pair, including expired visit
  /// windows.
  NotAuthorized,
  /// The account occupies a different gate and the relocation policy is
  /// strict.
  OccupiedElsewhere,
  /// Storage failed; retried internally, surfaced as a generic denial.
  ServerError,
}

impl DenyReason {
  /// Reader-facing message, also written to the history row.
  pub fn message(self) -> &'static str {
    match self {
      Self::UnknownCard => "card is not registered",
      Self::GateInactive => "gate is not available",
      Self::NotAuthorized => "access not granted for this gate",
      Self::OccupiedElsewhere => "already inside another gate",
      Self::ServerError => "internal error, try again",
    }
  }
}

/// What the terminal displays about the resolved account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
  pub account_id:   Uuid,
  pub display_name: String,
  pub kind:         AccountKind,
  pub company_name: String,
}

/// The structured response returned for every tap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapResponse {
  pub status:      TapStatus,
  pub message:     String,
  pub account:     Option<AccountSummary>,
  /// Hardware ids of every gate the account may currently access, for
  /// display on reader-side terminals. Only present on success.
  pub access_list: Option<Vec<i64>>,
}

impl TapResponse {
  pub fn denied(reason: DenyReason) -> Self {
    Self {
      status:      TapStatus::Denied,
      message:     reason.message().to_owned(),
      account:     None,
      access_list: None,
    }
  }
}
