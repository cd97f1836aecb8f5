//! The `AccessStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `portier-store-sqlite`).
//! Higher layers (`portier-engine`, `portier-api`) depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  account::{Account, AccountKind, Company, NewAccount},
  gate::{Gate, Location, NewGate},
  grant::{GateGrant, NewVisit, Visit},
  history::{HistoryRecord, NewHistory},
  occupancy::{OccupancyRecord, OccupancySnapshot, RelocationPolicy, TransitionEffect},
  violation::{NewViolation, ViolationRecord},
};

// ─── Tap transition types ────────────────────────────────────────────────────

/// Input to [`AccessStore::apply_tap`] — an authorized tap ready to be
/// applied to the occupancy state.
#[derive(Debug, Clone)]
pub struct TapTransition {
  pub event_id:   Option<String>,
  pub account_id: Uuid,
  pub gate_id:    Uuid,
  /// Frozen names for the occupancy row and the history row.
  pub snapshot:   OccupancySnapshot,
  pub policy:     RelocationPolicy,
  pub tapped_at:  DateTime<Utc>,
}

/// Outcome of [`AccessStore::apply_tap`]. Every variant carries the history
/// row written (or found) in the same transaction.
#[derive(Debug, Clone)]
pub enum TapApplied {
  /// The occupancy state changed and a success row was written.
  Applied {
    effect:  TransitionEffect,
    history: HistoryRecord,
  },
  /// The in-transaction grant re-check found no active grant for the gate;
  /// a denied row was written, occupancy is untouched. Happens when a grant
  /// is revoked (or a visit window closes) between the caller's
  /// authorization read and the transition.
  NotGranted { history: HistoryRecord },
  /// The account occupies a different gate and the policy is
  /// [`RelocationPolicy::Deny`]; a denied row was written, occupancy is
  /// untouched.
  OccupiedElsewhere {
    at_gate_id: Uuid,
    history:    HistoryRecord,
  },
  /// The event id was already recorded; nothing was written.
  AlreadyRecorded { history: HistoryRecord },
}

// ─── Dashboard read types ────────────────────────────────────────────────────

/// Live headcount for one gate.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GateHeadcount {
  pub gate_id:   Uuid,
  pub gate_name: String,
  pub count:     u32,
}

/// Today's successful taps for one account kind.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct KindCount {
  pub kind:  AccountKind,
  pub count: u32,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Portier storage backend.
///
/// History and violations are append-only; occupancy is the sole mutable
/// table, and every occupancy mutation is transactional with its audit row.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AccessStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reference data ────────────────────────────────────────────────────

  fn add_company(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Company, Self::Error>> + Send + '_;

  fn add_location(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Location, Self::Error>> + Send + '_;

  fn add_gate(
    &self,
    input: NewGate,
  ) -> impl Future<Output = Result<Gate, Self::Error>> + Send + '_;

  fn add_account(
    &self,
    input: NewAccount,
  ) -> impl Future<Output = Result<Account, Self::Error>> + Send + '_;

  fn get_account(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + '_;

  fn get_gate(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Gate>, Self::Error>> + Send + '_;

  fn get_location(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Location>, Self::Error>> + Send + '_;

  fn get_company(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Company>, Self::Error>> + Send + '_;

  /// Resolve a physical card uid to its account. Returns `None` for cards
  /// that match no account.
  fn find_account_by_card<'a>(
    &'a self,
    card_uid: &'a str,
  ) -> impl Future<Output = Result<Option<Account>, Self::Error>> + Send + 'a;

  /// Resolve the numeric identifier a reader reports to its gate.
  fn find_gate_by_hardware_id(
    &self,
    hardware_id: i64,
  ) -> impl Future<Output = Result<Option<Gate>, Self::Error>> + Send + '_;

  /// Assign or clear (`None`) an account's card uid.
  fn set_account_card(
    &self,
    account_id: Uuid,
    card_uid: Option<String>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_gate_active(
    &self,
    gate_id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_location_active(
    &self,
    location_id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_account_active(
    &self,
    account_id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Grant sources ─────────────────────────────────────────────────────

  fn assign_employee_gate(
    &self,
    account_id: Uuid,
    gate_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn revoke_employee_gate(
    &self,
    account_id: Uuid,
    gate_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_visit(
    &self,
    input: NewVisit,
  ) -> impl Future<Output = Result<Visit, Self::Error>> + Send + '_;

  /// Attach a gate to a visit; every guest of the visit may use it while the
  /// window is open.
  fn assign_visit_gate(
    &self,
    visit_id: Uuid,
    gate_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Register an account as a guest of a visit.
  fn add_visit_guest(
    &self,
    visit_id: Uuid,
    account_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Attach a gate to one specific guest of a visit, on top of the gates the
  /// visit itself grants.
  fn assign_visit_guest_gate(
    &self,
    visit_id: Uuid,
    account_id: Uuid,
    gate_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The union of all currently-granted gates for an account: static
  /// employee assignments (employee/intern kinds only) plus visit and
  /// visit-guest gates whose window contains `now`.
  fn granted_gates(
    &self,
    account_id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<GateGrant>, Self::Error>> + Send + '_;

  // ── Occupancy + history, transactional ───────────────────────────────

  /// Apply an authorized tap: re-verify the grant, read the account's
  /// occupancy, toggle or relocate per policy, and write the audit row — all
  /// in one transaction, deduplicated on `event_id`. The grant re-check
  /// keeps authorization consistent with the transition even when a grant
  /// is revoked after the caller's own authorization read.
  fn apply_tap(
    &self,
    transition: TapTransition,
  ) -> impl Future<Output = Result<TapApplied, Self::Error>> + Send + '_;

  fn current_occupancy(
    &self,
    account_id: Uuid,
  ) -> impl Future<Output = Result<Option<OccupancyRecord>, Self::Error>> + Send + '_;

  /// Administrative unassignment path: unconditionally delete any occupancy
  /// row for the account. Returns whether a row existed.
  fn clear_occupancy(
    &self,
    account_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Append a denied audit row (the success path writes its row inside
  /// [`Self::apply_tap`]). Deduplicated on `event_id`: replays return the
  /// existing row.
  fn append_history(
    &self,
    input: NewHistory,
  ) -> impl Future<Output = Result<HistoryRecord, Self::Error>> + Send + '_;

  fn find_history_by_event<'a>(
    &'a self,
    event_id: &'a str,
  ) -> impl Future<Output = Result<Option<HistoryRecord>, Self::Error>> + Send + 'a;

  // ── Violations ───────────────────────────────────────────────────────

  /// The account's current point balance: the latest record's
  /// `balance_after`, or `starting_balance` when none exists.
  fn latest_balance(
    &self,
    account_id: Uuid,
    starting_balance: i64,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Fold a deduction onto the account's balance, clamped at zero, and
  /// persist the record.
  fn append_violation(
    &self,
    input: NewViolation,
    starting_balance: i64,
  ) -> impl Future<Output = Result<ViolationRecord, Self::Error>> + Send + '_;

  /// Length of the account's trailing streak of denied taps (resets on any
  /// success). Read by denial-based violation policies; implementations may
  /// cap the scan at a documented recent-row window well above any sane
  /// policy threshold.
  fn consecutive_denials(
    &self,
    account_id: Uuid,
  ) -> impl Future<Output = Result<u32, Self::Error>> + Send + '_;

  // ── Dashboard reads ──────────────────────────────────────────────────

  /// Most recent `limit` history rows, newest first.
  fn recent_history(
    &self,
    limit: u32,
  ) -> impl Future<Output = Result<Vec<HistoryRecord>, Self::Error>> + Send + '_;

  /// Successful taps during the UTC day containing `now`, grouped by
  /// account kind.
  fn success_counts_today(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<KindCount>, Self::Error>> + Send + '_;

  /// Live headcount per gate, from current occupancy rows.
  fn occupancy_by_gate(
    &self,
  ) -> impl Future<Output = Result<Vec<GateHeadcount>, Self::Error>> + Send + '_;

  fn list_occupancy(
    &self,
  ) -> impl Future<Output = Result<Vec<OccupancyRecord>, Self::Error>> + Send + '_;
}
