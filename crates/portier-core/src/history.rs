//! History — the append-only audit trail of every tap attempt.
//!
//! One row per tap, success or denied. Rows are never updated or deleted.
//! Denied taps from an unresolved card still produce a row, with no account
//! link. `event_id` is the reader-assigned idempotency key; replays of the
//! same key return the original row instead of writing a second one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tap::DenyReason;

/// Outcome of a tap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
  Success,
  Denied,
}

/// One immutable audit row. Name fields are a snapshot taken at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRecord {
  pub history_id:   Uuid,
  /// Reader-assigned idempotency key, if the reader sent one.
  pub event_id:     Option<String>,
  /// `None` when the card resolved to no account.
  pub account_id:   Option<Uuid>,
  pub gate_id:      Option<Uuid>,
  pub card_uid:     String,
  pub account_name: Option<String>,
  pub gate_name:    Option<String>,
  pub company_name: Option<String>,
  pub status:       HistoryStatus,
  pub message:      String,
  /// When the reader saw the card.
  pub tapped_at:    DateTime<Utc>,
  /// Server-assigned timestamp of the write.
  pub synced_at:    DateTime<Utc>,
}

/// Input to [`crate::store::AccessStore::append_history`].
/// `history_id` and `synced_at` are always set by the store.
#[derive(Debug, Clone)]
pub struct NewHistory {
  pub event_id:     Option<String>,
  pub account_id:   Option<Uuid>,
  pub gate_id:      Option<Uuid>,
  pub card_uid:     String,
  pub account_name: Option<String>,
  pub gate_name:    Option<String>,
  pub company_name: Option<String>,
  pub status:       HistoryStatus,
  pub message:      String,
  pub tapped_at:    DateTime<Utc>,
}

impl NewHistory {
  /// A denied row for a card that resolved to nothing.
  pub fn denied_unresolved(
    event_id:  Option<String>,
    card_uid:  String,
    tapped_at: DateTime<Utc>,
  ) -> Self {
    Self {
      event_id,
      account_id: None,
      gate_id: None,
      card_uid,
      account_name: None,
      gate_name: None,
      company_name: None,
      status: HistoryStatus::Denied,
      message: DenyReason::UnknownCard.message().to_owned(),
      tapped_at,
    }
  }

  /// A denied row for a resolved account.
  #[allow(clippy::too_many_arguments)]
  pub fn denied(
    event_id:     Option<String>,
    account_id:   Uuid,
    gate_id:      Option<Uuid>,
    card_uid:     String,
    account_name: String,
    gate_name:    Option<String>,
    company_name: String,
    reason:       DenyReason,
    tapped_at:    DateTime<Utc>,
  ) -> Self {
    Self {
      event_id,
      account_id: Some(account_id),
      gate_id,
      card_uid,
      account_name: Some(account_name),
      gate_name,
      company_name: Some(company_name),
      status: HistoryStatus::Denied,
      message: reason.message().to_owned(),
      tapped_at,
    }
  }
}
