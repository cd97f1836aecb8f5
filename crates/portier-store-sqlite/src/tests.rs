//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use portier_core::{
  account::{Account, AccountKind, NewAccount},
  gate::{Gate, GateKind, NewGate},
  grant::NewVisit,
  history::{HistoryStatus, NewHistory},
  occupancy::{OccupancySnapshot, RelocationPolicy, TransitionEffect},
  store::{AccessStore, TapApplied, TapTransition},
  tap::DenyReason,
  violation::NewViolation,
};
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// A company, an active location, two gates, and one employee account with a
/// card and standing grants on both gates — the minimal world most tests
/// need.
struct Fixture {
  store:   SqliteStore,
  gate_a:  Gate,
  gate_b:  Gate,
  account: Account,
}

async fn fixture() -> Fixture {
  let s = store().await;

  let company  = s.add_company("Acme".into()).await.unwrap();
  let location = s.add_location("HQ".into()).await.unwrap();

  let gate_a = s
    .add_gate(NewGate {
      name:        "Gate A".into(),
      hardware_id: 1,
      location_id: location.location_id,
      kind:        GateKind::Physical,
    })
    .await
    .unwrap();
  let gate_b = s
    .add_gate(NewGate {
      name:        "Gate B".into(),
      hardware_id: 2,
      location_id: location.location_id,
      kind:        GateKind::Physical,
    })
    .await
    .unwrap();

  let account = s
    .add_account(NewAccount {
      card_uid:     Some("CARD-001".into()),
      display_name: "Erin Example".into(),
      kind:         AccountKind::Employee,
      company_id:   company.company_id,
    })
    .await
    .unwrap();
  s.assign_employee_gate(account.account_id, gate_a.gate_id)
    .await
    .unwrap();
  s.assign_employee_gate(account.account_id, gate_b.gate_id)
    .await
    .unwrap();

  Fixture { store: s, gate_a, gate_b, account }
}

fn transition(
  fx:       &Fixture,
  gate:     &Gate,
  policy:   RelocationPolicy,
  event_id: Option<&str>,
) -> TapTransition {
  TapTransition {
    event_id:   event_id.map(str::to_owned),
    account_id: fx.account.account_id,
    gate_id:    gate.gate_id,
    snapshot:   OccupancySnapshot {
      account_name: fx.account.display_name.clone(),
      gate_name:    gate.name.clone(),
      company_name: "Acme".into(),
      card_uid:     "CARD-001".into(),
    },
    policy,
    tapped_at: Utc::now(),
  }
}

// ─── Reference data ──────────────────────────────────────────────────────────

#[tokio::test]
async fn find_account_by_card() {
  let fx = fixture().await;

  let found = fx.store.find_account_by_card("CARD-001").await.unwrap();
  assert_eq!(found.unwrap().account_id, fx.account.account_id);

  let missing = fx.store.find_account_by_card("CARD-999").await.unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn find_gate_by_hardware_id() {
  let fx = fixture().await;

  let found = fx.store.find_gate_by_hardware_id(2).await.unwrap();
  assert_eq!(found.unwrap().gate_id, fx.gate_b.gate_id);

  assert!(fx.store.find_gate_by_hardware_id(99).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_card_uid_rejected() {
  let fx = fixture().await;
  let company = fx.store.add_company("Other".into()).await.unwrap();

  let err = fx
    .store
    .add_account(NewAccount {
      card_uid:     Some("CARD-001".into()),
      display_name: "Copycat".into(),
      kind:         AccountKind::Employee,
      company_id:   company.company_id,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, crate::Error::CardUidTaken(_)));
}

#[tokio::test]
async fn set_account_card_clears_and_reassigns() {
  let fx = fixture().await;

  fx.store
    .set_account_card(fx.account.account_id, None)
    .await
    .unwrap();
  assert!(fx.store.find_account_by_card("CARD-001").await.unwrap().is_none());

  fx.store
    .set_account_card(fx.account.account_id, Some("CARD-002".into()))
    .await
    .unwrap();
  assert!(fx.store.find_account_by_card("CARD-002").await.unwrap().is_some());
}

// ─── Grants ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn employee_grants_resolve() {
  let fx = fixture().await;

  let grants = fx
    .store
    .granted_gates(fx.account.account_id, Utc::now())
    .await
    .unwrap();
  assert_eq!(grants.len(), 2);
  assert_eq!(grants[0].gate_id, fx.gate_a.gate_id);
  assert_eq!(grants[0].hardware_id, 1);
  assert_eq!(grants[1].gate_id, fx.gate_b.gate_id);
}

#[tokio::test]
async fn revoked_employee_grant_disappears() {
  let fx = fixture().await;

  fx.store
    .revoke_employee_gate(fx.account.account_id, fx.gate_a.gate_id)
    .await
    .unwrap();

  let grants = fx
    .store
    .granted_gates(fx.account.account_id, Utc::now())
    .await
    .unwrap();
  assert_eq!(grants.len(), 1);
  assert_eq!(grants[0].gate_id, fx.gate_b.gate_id);
}

#[tokio::test]
async fn employee_grants_do_not_apply_to_guests() {
  let fx = fixture().await;
  let company = fx.store.add_company("Visitors Inc".into()).await.unwrap();

  let guest = fx
    .store
    .add_account(NewAccount {
      card_uid:     Some("CARD-G".into()),
      display_name: "Gail Guest".into(),
      kind:         AccountKind::Guest,
      company_id:   company.company_id,
    })
    .await
    .unwrap();

  // A stray employee-gate row for a guest account must not grant anything.
  assert!(!guest.kind.uses_employee_grants());
  fx.store
    .assign_employee_gate(guest.account_id, fx.gate_a.gate_id)
    .await
    .unwrap();

  let grants = fx
    .store
    .granted_gates(guest.account_id, Utc::now())
    .await
    .unwrap();
  assert!(grants.is_empty());
}

#[tokio::test]
async fn visit_grants_respect_window() {
  let fx = fixture().await;
  let company = fx.store.add_company("Visitors Inc".into()).await.unwrap();
  let now = Utc::now();

  let guest = fx
    .store
    .add_account(NewAccount {
      card_uid:     Some("CARD-G".into()),
      display_name: "Gail Guest".into(),
      kind:         AccountKind::Guest,
      company_id:   company.company_id,
    })
    .await
    .unwrap();

  let visit = fx
    .store
    .add_visit(NewVisit {
      company_id:  company.company_id,
      purpose:     Some("audit".into()),
      visit_date:  now - Duration::hours(1),
      valid_until: now + Duration::hours(1),
    })
    .await
    .unwrap();
  fx.store
    .assign_visit_gate(visit.visit_id, fx.gate_b.gate_id)
    .await
    .unwrap();
  fx.store
    .add_visit_guest(visit.visit_id, guest.account_id)
    .await
    .unwrap();

  // Inside the window: gate B is granted.
  assert!(visit.window_contains(now));
  let grants = fx.store.granted_gates(guest.account_id, now).await.unwrap();
  assert_eq!(grants.len(), 1);
  assert_eq!(grants[0].gate_id, fx.gate_b.gate_id);

  // One second past valid_until: nothing.
  let after = fx
    .store
    .granted_gates(guest.account_id, now + Duration::hours(1) + Duration::seconds(1))
    .await
    .unwrap();
  assert!(after.is_empty());
}

#[tokio::test]
async fn guest_specific_gate_grants() {
  let fx = fixture().await;
  let company = fx.store.add_company("Visitors Inc".into()).await.unwrap();
  let now = Utc::now();

  let guest = fx
    .store
    .add_account(NewAccount {
      card_uid:     Some("CARD-G".into()),
      display_name: "Gail Guest".into(),
      kind:         AccountKind::Guest,
      company_id:   company.company_id,
    })
    .await
    .unwrap();

  let visit = fx
    .store
    .add_visit(NewVisit {
      company_id:  company.company_id,
      purpose:     None,
      visit_date:  now - Duration::hours(1),
      valid_until: now + Duration::hours(1),
    })
    .await
    .unwrap();
  fx.store
    .add_visit_guest(visit.visit_id, guest.account_id)
    .await
    .unwrap();
  // No visit-wide gates; only a guest-specific grant for gate A.
  fx.store
    .assign_visit_guest_gate(visit.visit_id, guest.account_id, fx.gate_a.gate_id)
    .await
    .unwrap();

  let grants = fx.store.granted_gates(guest.account_id, now).await.unwrap();
  assert_eq!(grants.len(), 1);
  assert_eq!(grants[0].gate_id, fx.gate_a.gate_id);
}

// ─── Tap transitions ─────────────────────────────────────────────────────────

#[tokio::test]
async fn entry_then_exit_toggles_occupancy() {
  let fx = fixture().await;

  let first = fx
    .store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, None))
    .await
    .unwrap();
  match first {
    TapApplied::Applied { effect, history } => {
      assert_eq!(effect, TransitionEffect::Entered);
      assert_eq!(history.status, HistoryStatus::Success);
    }
    other => panic!("expected entry, got {other:?}"),
  }

  let occ = fx
    .store
    .current_occupancy(fx.account.account_id)
    .await
    .unwrap()
    .expect("occupancy after entry");
  assert_eq!(occ.gate_id, fx.gate_a.gate_id);
  assert_eq!(occ.snapshot.gate_name, "Gate A");

  let second = fx
    .store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, None))
    .await
    .unwrap();
  match second {
    TapApplied::Applied { effect, .. } => assert_eq!(effect, TransitionEffect::Exited),
    other => panic!("expected exit, got {other:?}"),
  }

  assert!(fx
    .store
    .current_occupancy(fx.account.account_id)
    .await
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn relocation_policy_moves_occupancy() {
  let fx = fixture().await;

  fx.store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, None))
    .await
    .unwrap();

  let moved = fx
    .store
    .apply_tap(transition(&fx, &fx.gate_b, RelocationPolicy::Relocate, None))
    .await
    .unwrap();
  match moved {
    TapApplied::Applied { effect, history } => {
      assert_eq!(
        effect,
        TransitionEffect::Relocated { from_gate_id: fx.gate_a.gate_id }
      );
      assert!(history.message.contains("Gate B"));
      assert!(history.message.contains("Gate A"));
    }
    other => panic!("expected relocation, got {other:?}"),
  }

  let occ = fx
    .store
    .current_occupancy(fx.account.account_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(occ.gate_id, fx.gate_b.gate_id);
}

#[tokio::test]
async fn deny_policy_keeps_occupancy_and_writes_denied_row() {
  let fx = fixture().await;

  fx.store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Deny, None))
    .await
    .unwrap();

  let denied = fx
    .store
    .apply_tap(transition(&fx, &fx.gate_b, RelocationPolicy::Deny, None))
    .await
    .unwrap();
  match denied {
    TapApplied::OccupiedElsewhere { at_gate_id, history } => {
      assert_eq!(at_gate_id, fx.gate_a.gate_id);
      assert_eq!(history.status, HistoryStatus::Denied);
      assert_eq!(history.message, DenyReason::OccupiedElsewhere.message());
    }
    other => panic!("expected occupied-elsewhere, got {other:?}"),
  }

  // Still inside gate A.
  let occ = fx
    .store
    .current_occupancy(fx.account.account_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(occ.gate_id, fx.gate_a.gate_id);
}

#[tokio::test]
async fn grant_revoked_before_transition_is_denied() {
  let fx = fixture().await;

  // Authorization read sees the grant, then the grant disappears before the
  // transition runs. The transaction's own re-check must refuse entry.
  let grants = fx
    .store
    .granted_gates(fx.account.account_id, Utc::now())
    .await
    .unwrap();
  assert!(grants.iter().any(|g| g.gate_id == fx.gate_a.gate_id));

  fx.store
    .revoke_employee_gate(fx.account.account_id, fx.gate_a.gate_id)
    .await
    .unwrap();

  let applied = fx
    .store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, None))
    .await
    .unwrap();
  match applied {
    TapApplied::NotGranted { history } => {
      assert_eq!(history.status, HistoryStatus::Denied);
      assert_eq!(history.message, DenyReason::NotAuthorized.message());
    }
    other => panic!("expected grant re-check denial, got {other:?}"),
  }

  assert!(fx
    .store
    .current_occupancy(fx.account.account_id)
    .await
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn replayed_event_id_does_not_retoggle() {
  let fx = fixture().await;

  fx.store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, Some("evt-1")))
    .await
    .unwrap();

  // Retransmission of the same event.
  let replay = fx
    .store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, Some("evt-1")))
    .await
    .unwrap();
  assert!(matches!(replay, TapApplied::AlreadyRecorded { .. }));

  // Still inside: the replay did not toggle an exit.
  assert!(fx
    .store
    .current_occupancy(fx.account.account_id)
    .await
    .unwrap()
    .is_some());

  // And only one audit row exists.
  let history = fx.store.recent_history(10).await.unwrap();
  assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn clear_occupancy_reports_whether_row_existed() {
  let fx = fixture().await;

  assert!(!fx.store.clear_occupancy(fx.account.account_id).await.unwrap());

  fx.store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, None))
    .await
    .unwrap();
  assert!(fx.store.clear_occupancy(fx.account.account_id).await.unwrap());
  assert!(fx
    .store
    .current_occupancy(fx.account.account_id)
    .await
    .unwrap()
    .is_none());
}

// ─── History ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn denied_history_without_account_link() {
  let fx = fixture().await;

  let rec = fx
    .store
    .append_history(NewHistory::denied_unresolved(
      None,
      "CARD-UNKNOWN".into(),
      Utc::now(),
    ))
    .await
    .unwrap();

  assert_eq!(rec.status, HistoryStatus::Denied);
  assert!(rec.account_id.is_none());
  assert_eq!(rec.card_uid, "CARD-UNKNOWN");
  assert_eq!(rec.message, DenyReason::UnknownCard.message());
}

#[tokio::test]
async fn append_history_dedupes_on_event_id() {
  let fx = fixture().await;

  let first = fx
    .store
    .append_history(NewHistory::denied_unresolved(
      Some("evt-9".into()),
      "CARD-UNKNOWN".into(),
      Utc::now(),
    ))
    .await
    .unwrap();
  let second = fx
    .store
    .append_history(NewHistory::denied_unresolved(
      Some("evt-9".into()),
      "CARD-UNKNOWN".into(),
      Utc::now(),
    ))
    .await
    .unwrap();

  assert_eq!(first.history_id, second.history_id);
  assert_eq!(fx.store.recent_history(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn recent_history_newest_first() {
  let fx = fixture().await;
  let base = Utc::now();

  for i in 0..3 {
    let mut input =
      NewHistory::denied_unresolved(None, format!("CARD-{i}"), base + Duration::seconds(i));
    input.message = format!("tap {i}");
    fx.store.append_history(input).await.unwrap();
  }

  let recent = fx.store.recent_history(2).await.unwrap();
  assert_eq!(recent.len(), 2);
  assert_eq!(recent[0].message, "tap 2");
  assert_eq!(recent[1].message, "tap 1");
}

// ─── Violations ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn violation_balance_folds_and_clamps() {
  let fx = fixture().await;
  let account_id = fx.account.account_id;

  assert_eq!(fx.store.latest_balance(account_id, 100).await.unwrap(), 100);

  let first = fx
    .store
    .append_violation(
      NewViolation {
        account_id,
        points: 30,
        description: "repeated denials".into(),
        violated_at: Utc::now(),
        scanned_at: None,
      },
      100,
    )
    .await
    .unwrap();
  assert_eq!(first.balance_before, 100);
  assert_eq!(first.points_deducted, 30);
  assert_eq!(first.balance_after, 70);

  // A deduction larger than the remaining balance clamps at zero.
  let second = fx
    .store
    .append_violation(
      NewViolation {
        account_id,
        points: 90,
        description: "gate misuse".into(),
        violated_at: Utc::now(),
        scanned_at: None,
      },
      100,
    )
    .await
    .unwrap();
  assert_eq!(second.balance_before, 70);
  assert_eq!(second.points_deducted, 70);
  assert_eq!(second.balance_after, 0);

  assert_eq!(fx.store.latest_balance(account_id, 100).await.unwrap(), 0);
}

#[tokio::test]
async fn consecutive_denials_resets_on_success() {
  let fx = fixture().await;
  let base = Utc::now();

  let denied = |i: i64| {
    let mut input = NewHistory::denied_unresolved(
      None,
      "CARD-001".into(),
      base + Duration::seconds(i),
    );
    input.account_id = Some(fx.account.account_id);
    input
  };

  fx.store.append_history(denied(0)).await.unwrap();
  fx.store.append_history(denied(1)).await.unwrap();
  assert_eq!(
    fx.store.consecutive_denials(fx.account.account_id).await.unwrap(),
    2
  );

  // A successful tap resets the streak.
  let mut tap = transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, None);
  tap.tapped_at = base + Duration::seconds(2);
  fx.store.apply_tap(tap).await.unwrap();
  assert_eq!(
    fx.store.consecutive_denials(fx.account.account_id).await.unwrap(),
    0
  );

  fx.store.append_history(denied(3)).await.unwrap();
  assert_eq!(
    fx.store.consecutive_denials(fx.account.account_id).await.unwrap(),
    1
  );
}

// ─── Dashboard reads ─────────────────────────────────────────────────────────

#[tokio::test]
async fn occupancy_by_gate_headcount() {
  let fx = fixture().await;
  let company = fx.store.add_company("Visitors Inc".into()).await.unwrap();

  fx.store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, None))
    .await
    .unwrap();

  let other = fx
    .store
    .add_account(NewAccount {
      card_uid:     Some("CARD-002".into()),
      display_name: "Omar Other".into(),
      kind:         AccountKind::Intern,
      company_id:   company.company_id,
    })
    .await
    .unwrap();
  fx.store
    .assign_employee_gate(other.account_id, fx.gate_a.gate_id)
    .await
    .unwrap();
  fx.store
    .apply_tap(TapTransition {
      event_id:   None,
      account_id: other.account_id,
      gate_id:    fx.gate_a.gate_id,
      snapshot:   OccupancySnapshot {
        account_name: other.display_name.clone(),
        gate_name:    fx.gate_a.name.clone(),
        company_name: "Visitors Inc".into(),
        card_uid:     "CARD-002".into(),
      },
      policy:    RelocationPolicy::Relocate,
      tapped_at: Utc::now(),
    })
    .await
    .unwrap();

  let headcounts = fx.store.occupancy_by_gate().await.unwrap();
  assert_eq!(headcounts.len(), 1);
  assert_eq!(headcounts[0].gate_name, "Gate A");
  assert_eq!(headcounts[0].count, 2);

  assert_eq!(fx.store.list_occupancy().await.unwrap().len(), 2);
}

#[tokio::test]
async fn success_counts_grouped_by_kind() {
  let fx = fixture().await;
  let now = Utc::now();

  fx.store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, None))
    .await
    .unwrap();
  fx.store
    .apply_tap(transition(&fx, &fx.gate_a, RelocationPolicy::Relocate, None))
    .await
    .unwrap();

  // A denied row must not count.
  fx.store
    .append_history(NewHistory::denied_unresolved(None, "CARD-X".into(), now))
    .await
    .unwrap();

  let counts = fx.store.success_counts_today(now).await.unwrap();
  assert_eq!(counts.len(), 1);
  assert_eq!(counts[0].kind, AccountKind::Employee);
  assert_eq!(counts[0].count, 2);
}

#[tokio::test]
async fn uuid_missing_lookups_return_none() {
  let fx = fixture().await;
  assert!(fx.store.get_account(Uuid::new_v4()).await.unwrap().is_none());
  assert!(fx.store.get_gate(Uuid::new_v4()).await.unwrap().is_none());
  assert!(fx.store.get_location(Uuid::new_v4()).await.unwrap().is_none());
  assert!(fx.store.get_company(Uuid::new_v4()).await.unwrap().is_none());
}
