//! Accounts and companies — the identities that tap gates.
//!
//! Accounts are reference data owned by the identity subsystem. The access
//! core reads them to resolve cards and build snapshots; it never mutates
//! anything here except the card assignment itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The category of a person holding a card. Drives which grant sources apply
/// and how dashboard counts are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
  Employee,
  Intern,
  Guest,
}

impl AccountKind {
  /// Whether static employee-gate assignments apply to this kind.
  pub fn uses_employee_grants(self) -> bool {
    matches!(self, Self::Employee | Self::Intern)
  }
}

/// The company an account belongs to; its name is frozen into occupancy and
/// history snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
  pub company_id: Uuid,
  pub name:       String,
  pub created_at: DateTime<Utc>,
}

/// A person who may present a card at a gate reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
  pub account_id:   Uuid,
  /// The physical NFC card identifier; `None` while no card is assigned.
  pub card_uid:     Option<String>,
  pub display_name: String,
  pub kind:         AccountKind,
  pub company_id:   Uuid,
  pub active:       bool,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::AccessStore::add_account`].
#[derive(Debug, Clone)]
pub struct NewAccount {
  pub card_uid:     Option<String>,
  pub display_name: String,
  pub kind:         AccountKind,
  pub company_id:   Uuid,
}
