//! Violations — point deductions against an account's standing.
//!
//! Append-only. The running balance is whatever the latest record's
//! `balance_after` says (or the configured starting balance when no record
//! exists); it is floored at zero, so a deduction larger than the remaining
//! balance is clamped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One point-deduction event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
  pub violation_id:    Uuid,
  pub account_id:      Uuid,
  pub balance_before:  i64,
  /// The amount actually deducted, after clamping at a zero balance.
  pub points_deducted: i64,
  pub balance_after:   i64,
  pub description:     String,
  pub violated_at:     DateTime<Utc>,
  /// Links the deduction to the triggering tap, when there is one.
  pub scanned_at:      Option<DateTime<Utc>>,
}

/// Input to [`crate::store::AccessStore::append_violation`]. The balance
/// fields are computed by the store from the latest existing record.
#[derive(Debug, Clone)]
pub struct NewViolation {
  pub account_id:  Uuid,
  /// Requested deduction; may be clamped so the balance never goes negative.
  pub points:      i64,
  pub description: String,
  pub violated_at: DateTime<Utc>,
  pub scanned_at:  Option<DateTime<Utc>>,
}
