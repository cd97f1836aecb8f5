//! Pluggable violation policies.
//!
//! The violation ledger records point deductions; deciding *when* one fires
//! is policy. The processor evaluates the configured policy best-effort
//! after each tap is recorded, so a policy failure can never affect the tap
//! outcome itself.

use chrono::{DateTime, Utc};
use portier_core::{
  account::{Account, AccountKind},
  history::HistoryStatus,
};

/// What the processor knows about a just-recorded tap when it asks the
/// policy whether to deduct points.
#[derive(Debug)]
pub struct TapAudit<'a> {
  pub account:             &'a Account,
  pub status:              HistoryStatus,
  /// Trailing streak of denied taps, including this one if it was denied.
  pub consecutive_denials: u32,
  pub tapped_at:           DateTime<Utc>,
}

/// A deduction the policy wants applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deduction {
  pub points:      i64,
  pub description: String,
}

pub trait ViolationPolicy: Send + Sync {
  fn evaluate(&self, audit: &TapAudit<'_>) -> Option<Deduction>;
}

/// Deducts points each time an employee's denial streak reaches a multiple
/// of `threshold`. Guests and interns are out of scope for point scoring.
#[derive(Debug, Clone)]
pub struct ConsecutiveDenials {
  pub threshold: u32,
  pub points:    i64,
}

impl Default for ConsecutiveDenials {
  fn default() -> Self {
    Self { threshold: 3, points: 5 }
  }
}

impl ViolationPolicy for ConsecutiveDenials {
  fn evaluate(&self, audit: &TapAudit<'_>) -> Option<Deduction> {
    if self.threshold == 0
      || audit.account.kind != AccountKind::Employee
      || audit.status != HistoryStatus::Denied
    {
      return None;
    }
    if audit.consecutive_denials == 0
      || audit.consecutive_denials % self.threshold != 0
    {
      return None;
    }
    Some(Deduction {
      points:      self.points,
      description: format!(
        "{} consecutive denied taps",
        audit.consecutive_denials
      ),
    })
  }
}

/// Disables the violation side effect entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoViolations;

impl ViolationPolicy for NoViolations {
  fn evaluate(&self, _audit: &TapAudit<'_>) -> Option<Deduction> { None }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  fn account(kind: AccountKind) -> Account {
    Account {
      account_id:   Uuid::new_v4(),
      card_uid:     Some("CARD-1".into()),
      display_name: "Erin".into(),
      kind,
      company_id:   Uuid::new_v4(),
      active:       true,
      created_at:   Utc::now(),
    }
  }

  fn audit(account: &Account, status: HistoryStatus, streak: u32) -> TapAudit<'_> {
    TapAudit {
      account,
      status,
      consecutive_denials: streak,
      tapped_at: Utc::now(),
    }
  }

  #[test]
  fn fires_at_threshold() {
    let policy = ConsecutiveDenials { threshold: 3, points: 5 };
    let emp = account(AccountKind::Employee);

    assert!(policy.evaluate(&audit(&emp, HistoryStatus::Denied, 2)).is_none());
    let d = policy
      .evaluate(&audit(&emp, HistoryStatus::Denied, 3))
      .expect("deduction at threshold");
    assert_eq!(d.points, 5);
  }

  #[test]
  fn fires_again_at_multiples_only() {
    let policy = ConsecutiveDenials { threshold: 3, points: 5 };
    let emp = account(AccountKind::Employee);

    assert!(policy.evaluate(&audit(&emp, HistoryStatus::Denied, 4)).is_none());
    assert!(policy.evaluate(&audit(&emp, HistoryStatus::Denied, 6)).is_some());
  }

  #[test]
  fn success_and_non_employees_never_fire() {
    let policy = ConsecutiveDenials { threshold: 3, points: 5 };
    let emp = account(AccountKind::Employee);
    let guest = account(AccountKind::Guest);

    assert!(policy.evaluate(&audit(&emp, HistoryStatus::Success, 3)).is_none());
    assert!(policy.evaluate(&audit(&guest, HistoryStatus::Denied, 3)).is_none());
  }

  #[test]
  fn no_violations_is_inert() {
    let emp = account(AccountKind::Employee);
    assert!(NoViolations.evaluate(&audit(&emp, HistoryStatus::Denied, 30)).is_none());
  }
}
