//! [`TapProcessor`] — the tap state machine.
//!
//! Every tap runs Received → Resolving → Authorizing → Transitioning →
//! Recorded and always terminates in a recorded outcome: denied paths still
//! write an audit row, and storage failures surface to the reader as a
//! generic denial, never as an error. Side effects on occupancy and history
//! happen only here (card unassignment being the sole administrative
//! exception).

use std::sync::Arc;

use chrono::Utc;
use portier_core::{
  account::Account,
  gate::Gate,
  history::{HistoryRecord, HistoryStatus, NewHistory},
  occupancy::{OccupancySnapshot, RelocationPolicy},
  store::{AccessStore, TapApplied, TapTransition},
  tap::{AccountSummary, DenyReason, TapEvent, TapResponse, TapStatus},
  violation::NewViolation,
};

use crate::{
  directory,
  locks::AccountLocks,
  policy::{TapAudit, ViolationPolicy},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
  pub relocation_policy: RelocationPolicy,
  /// Point balance an account starts from before any violation.
  pub starting_balance:  i64,
}

impl Default for ProcessorConfig {
  fn default() -> Self {
    Self {
      relocation_policy: RelocationPolicy::default(),
      starting_balance:  100,
    }
  }
}

// ─── Processor ───────────────────────────────────────────────────────────────

pub struct TapProcessor<S> {
  store:  Arc<S>,
  locks:  AccountLocks,
  policy: Arc<dyn ViolationPolicy>,
  config: ProcessorConfig,
}

impl<S: AccessStore> TapProcessor<S> {
  pub fn new(
    store: Arc<S>,
    config: ProcessorConfig,
    policy: Arc<dyn ViolationPolicy>,
  ) -> Self {
    Self {
      store,
      locks: AccountLocks::new(),
      policy,
      config,
    }
  }

  /// Process one tap event to its terminal recorded state.
  pub async fn process(&self, tap: TapEvent) -> TapResponse {
    // Replay fast path: a known event id returns the recorded outcome
    // without touching anything. `apply_tap` re-checks inside its
    // transaction, so a race here is harmless.
    if let Some(eid) = tap.event_id.as_deref() {
      match self.store.find_history_by_event(eid).await {
        Ok(Some(recorded)) => {
          tracing::debug!(event_id = eid, "replayed tap event");
          return response_from_history(&recorded);
        }
        Ok(None) => {}
        Err(e) => return storage_denied("idempotency probe", &e),
      }
    }

    // Resolving: card → account. Inactive accounts resolve like unknown
    // cards; their card is effectively dead.
    let account = match self.store.find_account_by_card(&tap.card_uid).await {
      Ok(Some(a)) if a.active => a,
      Ok(_) => return self.deny_unresolved(&tap).await,
      Err(e) => return storage_denied("card resolution", &e),
    };

    let company_name = match self.store.get_company(account.company_id).await {
      Ok(Some(c)) => c.name,
      Ok(None) => {
        tracing::warn!(account = %account.account_id, "account references missing company");
        String::new()
      }
      Err(e) => return storage_denied("company lookup", &e),
    };

    let gate = match self.store.find_gate_by_hardware_id(tap.gate_identifier).await {
      Ok(Some(g)) => g,
      Ok(None) => {
        tracing::warn!(
          gate_identifier = tap.gate_identifier,
          "tap from unrecognised gate identifier"
        );
        return self
          .deny_resolved(&tap, &account, None, &company_name, DenyReason::GateInactive)
          .await;
      }
      Err(e) => return storage_denied("gate resolution", &e),
    };

    // Authorizing.
    let location = match self.store.get_location(gate.location_id).await {
      Ok(Some(l)) => l,
      Ok(None) => {
        return self
          .deny_resolved(&tap, &account, Some(&gate), &company_name, DenyReason::GateInactive)
          .await;
      }
      Err(e) => return storage_denied("location lookup", &e),
    };

    let granted = match self
      .store
      .granted_gates(account.account_id, tap.tapped_at)
      .await
    {
      Ok(g) => g,
      Err(e) => return storage_denied("grant resolution", &e),
    };

    if let Err(reason) = directory::authorize(&gate, &location, &granted) {
      return self
        .deny_resolved(&tap, &account, Some(&gate), &company_name, reason)
        .await;
    }

    // Transitioning + Recorded, serialized per account.
    let transition = TapTransition {
      event_id:   tap.event_id.clone(),
      account_id: account.account_id,
      gate_id:    gate.gate_id,
      snapshot:   OccupancySnapshot {
        account_name: account.display_name.clone(),
        gate_name:    gate.name.clone(),
        company_name: company_name.clone(),
        card_uid:     tap.card_uid.clone(),
      },
      policy:    self.config.relocation_policy,
      tapped_at: tap.tapped_at,
    };

    let lock = self.locks.for_account(account.account_id);
    let applied = {
      let _guard = lock.lock().await;
      match self.store.apply_tap(transition).await {
        Ok(a) => a,
        Err(e) => return storage_denied("occupancy transition", &e),
      }
    };

    match applied {
      TapApplied::Applied { effect, history } => {
        tracing::info!(
          account = %account.account_id,
          gate = %gate.name,
          ?effect,
          "tap recorded"
        );
        TapResponse {
          status:      TapStatus::Success,
          message:     history.message,
          account:     Some(AccountSummary {
            account_id:   account.account_id,
            display_name: account.display_name.clone(),
            kind:         account.kind,
            company_name,
          }),
          access_list: Some(directory::access_list(&granted)),
        }
      }
      TapApplied::NotGranted { history } => {
        tracing::info!(
          account = %account.account_id,
          gate = %gate.name,
          "tap denied, grant revoked before transition"
        );
        self.check_violation(&account, &history).await;
        TapResponse::denied(DenyReason::NotAuthorized)
      }
      TapApplied::OccupiedElsewhere { at_gate_id, history } => {
        tracing::info!(
          account = %account.account_id,
          gate = %gate.name,
          occupying = %at_gate_id,
          "tap denied, account occupying another gate"
        );
        self.check_violation(&account, &history).await;
        TapResponse::denied(DenyReason::OccupiedElsewhere)
      }
      TapApplied::AlreadyRecorded { history } => response_from_history(&history),
    }
  }

  /// Denied path for a card that resolved to no active account.
  async fn deny_unresolved(&self, tap: &TapEvent) -> TapResponse {
    tracing::info!(card_uid = %tap.card_uid, "tap denied, unknown card");
    let input = NewHistory::denied_unresolved(
      tap.event_id.clone(),
      tap.card_uid.clone(),
      tap.tapped_at,
    );
    if let Err(e) = self.store.append_history(input).await {
      return storage_denied("denied-tap audit", &e);
    }
    TapResponse::denied(DenyReason::UnknownCard)
  }

  /// Denied path for a resolved account; writes the audit row, then gives
  /// the violation policy a chance to score it.
  async fn deny_resolved(
    &self,
    tap:          &TapEvent,
    account:      &Account,
    gate:         Option<&Gate>,
    company_name: &str,
    reason:       DenyReason,
  ) -> TapResponse {
    tracing::info!(
      account = %account.account_id,
      gate_identifier = tap.gate_identifier,
      ?reason,
      "tap denied"
    );
    let input = NewHistory::denied(
      tap.event_id.clone(),
      account.account_id,
      gate.map(|g| g.gate_id),
      tap.card_uid.clone(),
      account.display_name.clone(),
      gate.map(|g| g.name.clone()),
      company_name.to_owned(),
      reason,
      tap.tapped_at,
    );
    match self.store.append_history(input).await {
      Ok(history) => {
        self.check_violation(account, &history).await;
        TapResponse::denied(reason)
      }
      Err(e) => storage_denied("denied-tap audit", &e),
    }
  }

  /// Best-effort post-commit policy evaluation; never affects the response.
  async fn check_violation(&self, account: &Account, history: &HistoryRecord) {
    let streak = match self.store.consecutive_denials(account.account_id).await {
      Ok(n) => n,
      Err(e) => {
        tracing::warn!(error = %e, "could not read denial streak");
        return;
      }
    };

    let audit = TapAudit {
      account,
      status: history.status,
      consecutive_denials: streak,
      tapped_at: history.tapped_at,
    };

    let Some(deduction) = self.policy.evaluate(&audit) else {
      return;
    };

    let result = self
      .store
      .append_violation(
        NewViolation {
          account_id:  account.account_id,
          points:      deduction.points,
          description: deduction.description,
          violated_at: Utc::now(),
          scanned_at:  Some(history.tapped_at),
        },
        self.config.starting_balance,
      )
      .await;

    match result {
      Ok(v) => tracing::info!(
        account = %account.account_id,
        deducted = v.points_deducted,
        balance = v.balance_after,
        "violation recorded"
      ),
      Err(e) => tracing::error!(error = %e, "failed to record violation"),
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Rebuild the reader response for a previously recorded tap.
fn response_from_history(history: &HistoryRecord) -> TapResponse {
  TapResponse {
    status:      match history.status {
      HistoryStatus::Success => TapStatus::Success,
      HistoryStatus::Denied => TapStatus::Denied,
    },
    message:     history.message.clone(),
    account:     None,
    access_list: None,
  }
}

/// Storage failed; log it and hand the reader a generic denial.
fn storage_denied(stage: &'static str, error: &dyn std::error::Error) -> TapResponse {
  tracing::error!(error = %error, stage, "storage failure while processing tap");
  TapResponse::denied(DenyReason::ServerError)
}
