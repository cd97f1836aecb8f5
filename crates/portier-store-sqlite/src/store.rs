//! [`SqliteStore`] — the SQLite implementation of [`AccessStore`].

use std::path::Path;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use portier_core::{
  account::{Account, Company, NewAccount},
  gate::{Gate, Location, NewGate},
  grant::{GateGrant, NewVisit, Visit},
  history::{HistoryRecord, HistoryStatus, NewHistory},
  occupancy::{OccupancyRecord, RelocationPolicy, TransitionEffect},
  store::{AccessStore, GateHeadcount, KindCount, TapApplied, TapTransition},
  tap::DenyReason,
  violation::{NewViolation, ViolationRecord},
};

use crate::{
  encode::{
    decode_account_kind, decode_uuid, encode_account_kind, encode_dt,
    encode_gate_kind, encode_history_status, encode_uuid, RawAccount,
    RawCompany, RawGate, RawHistory, RawLocation, RawOccupancy, RawViolation,
  },
  schema::SCHEMA,
  Error, Result,
};

/// How many times a busy database is retried before surfacing [`Error::Busy`].
const BUSY_RETRIES: u32 = 3;

/// How many recent history rows the denial-streak scan inspects. Streaks
/// longer than this report the cap; policy thresholds sit far below it.
const DENIAL_SCAN_LIMIT: u32 = 50;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Portier access store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Raw transition result ──────────────────────────────────────────────────

/// What the `apply_tap` transaction produced, in column form. Decoded into
/// [`TapApplied`] outside the connection closure.
enum RawApplied {
  Applied {
    effect:  RawEffect,
    history: RawHistory,
  },
  NotGranted {
    history: RawHistory,
  },
  OccupiedElsewhere {
    at_gate_id: String,
    history:    RawHistory,
  },
  AlreadyRecorded {
    history: RawHistory,
  },
}

enum RawEffect {
  Entered,
  Exited,
  Relocated { from_gate_id: String },
}

// ─── AccessStore impl ────────────────────────────────────────────────────────

impl AccessStore for SqliteStore {
  type Error = Error;

  // ── Reference data ────────────────────────────────────────────────────────

  async fn add_company(&self, name: String) -> Result<Company> {
    let company = Company {
      company_id: Uuid::new_v4(),
      name,
      created_at: Utc::now(),
    };

    let id_str   = encode_uuid(company.company_id);
    let at_str   = encode_dt(company.created_at);
    let name_str = company.name.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO companies (company_id, name, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, name_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(company)
  }

  async fn add_location(&self, name: String) -> Result<Location> {
    let location = Location {
      location_id: Uuid::new_v4(),
      name,
      active: true,
      created_at: Utc::now(),
    };

    let id_str   = encode_uuid(location.location_id);
    let at_str   = encode_dt(location.created_at);
    let name_str = location.name.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO locations (location_id, name, active, created_at)
           VALUES (?1, ?2, 1, ?3)",
          rusqlite::params![id_str, name_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(location)
  }

  async fn add_gate(&self, input: NewGate) -> Result<Gate> {
    let gate = Gate {
      gate_id:     Uuid::new_v4(),
      name:        input.name,
      hardware_id: input.hardware_id,
      location_id: input.location_id,
      kind:        input.kind,
      active:      true,
      created_at:  Utc::now(),
    };

    let id_str       = encode_uuid(gate.gate_id);
    let name_str     = gate.name.clone();
    let hardware_id  = gate.hardware_id;
    let location_str = encode_uuid(gate.location_id);
    let kind_str     = encode_gate_kind(gate.kind).to_owned();
    let at_str       = encode_dt(gate.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO gates (gate_id, name, hardware_id, location_id, kind, active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
          rusqlite::params![id_str, name_str, hardware_id, location_str, kind_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(gate)
  }

  async fn add_account(&self, input: NewAccount) -> Result<Account> {
    let account = Account {
      account_id:   Uuid::new_v4(),
      card_uid:     input.card_uid,
      display_name: input.display_name,
      kind:         input.kind,
      company_id:   input.company_id,
      active:       true,
      created_at:   Utc::now(),
    };

    let id_str      = encode_uuid(account.account_id);
    let card_uid    = account.card_uid.clone();
    let name_str    = account.display_name.clone();
    let kind_str    = encode_account_kind(account.kind).to_owned();
    let company_str = encode_uuid(account.company_id);
    let at_str      = encode_dt(account.created_at);

    let result = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO accounts (account_id, card_uid, display_name, kind, company_id, active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
          rusqlite::params![id_str, card_uid, name_str, kind_str, company_str, at_str],
        )?;
        Ok(())
      })
      .await;

    match result {
      Ok(()) => Ok(account),
      Err(e) => Err(map_card_conflict(e.into(), account.card_uid.as_deref())),
    }
  }

  async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT account_id, card_uid, display_name, kind, company_id, active, created_at
             FROM accounts WHERE account_id = ?1",
            rusqlite::params![id_str],
            account_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  async fn get_gate(&self, id: Uuid) -> Result<Option<Gate>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawGate> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT gate_id, name, hardware_id, location_id, kind, active, created_at
             FROM gates WHERE gate_id = ?1",
            rusqlite::params![id_str],
            gate_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawGate::into_gate).transpose()
  }

  async fn get_location(&self, id: Uuid) -> Result<Option<Location>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawLocation> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT location_id, name, active, created_at
             FROM locations WHERE location_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawLocation {
                location_id: row.get(0)?,
                name:        row.get(1)?,
                active:      row.get(2)?,
                created_at:  row.get(3)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawLocation::into_location).transpose()
  }

  async fn get_company(&self, id: Uuid) -> Result<Option<Company>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawCompany> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT company_id, name, created_at FROM companies WHERE company_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawCompany {
                company_id: row.get(0)?,
                name:       row.get(1)?,
                created_at: row.get(2)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawCompany::into_company).transpose()
  }

  async fn find_account_by_card(&self, card_uid: &str) -> Result<Option<Account>> {
    let card = card_uid.to_owned();

    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT account_id, card_uid, display_name, kind, company_id, active, created_at
             FROM accounts WHERE card_uid = ?1",
            rusqlite::params![card],
            account_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAccount::into_account).transpose()
  }

  async fn find_gate_by_hardware_id(&self, hardware_id: i64) -> Result<Option<Gate>> {
    let raw: Option<RawGate> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT gate_id, name, hardware_id, location_id, kind, active, created_at
             FROM gates WHERE hardware_id = ?1",
            rusqlite::params![hardware_id],
            gate_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawGate::into_gate).transpose()
  }

  async fn set_account_card(
    &self,
    account_id: Uuid,
    card_uid: Option<String>,
  ) -> Result<()> {
    let id_str = encode_uuid(account_id);
    let card   = card_uid.clone();

    let result = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE accounts SET card_uid = ?2 WHERE account_id = ?1",
          rusqlite::params![id_str, card],
        )?;
        Ok(changed)
      })
      .await;

    match result {
      Ok(0) => Err(Error::AccountNotFound(account_id)),
      Ok(_) => Ok(()),
      Err(e) => Err(map_card_conflict(e.into(), card_uid.as_deref())),
    }
  }

  async fn set_gate_active(&self, gate_id: Uuid, active: bool) -> Result<()> {
    let id_str = encode_uuid(gate_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE gates SET active = ?2 WHERE gate_id = ?1",
          rusqlite::params![id_str, active],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::GateNotFound(gate_id));
    }
    Ok(())
  }

  async fn set_location_active(&self, location_id: Uuid, active: bool) -> Result<()> {
    let id_str = encode_uuid(location_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE locations SET active = ?2 WHERE location_id = ?1",
          rusqlite::params![id_str, active],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::LocationNotFound(location_id));
    }
    Ok(())
  }

  async fn set_account_active(&self, account_id: Uuid, active: bool) -> Result<()> {
    let id_str = encode_uuid(account_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE accounts SET active = ?2 WHERE account_id = ?1",
          rusqlite::params![id_str, active],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(Error::AccountNotFound(account_id));
    }
    Ok(())
  }

  // ── Grant sources ─────────────────────────────────────────────────────────

  async fn assign_employee_gate(&self, account_id: Uuid, gate_id: Uuid) -> Result<()> {
    let account_str = encode_uuid(account_id);
    let gate_str    = encode_uuid(gate_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO employee_gates (account_id, gate_id) VALUES (?1, ?2)",
          rusqlite::params![account_str, gate_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn revoke_employee_gate(&self, account_id: Uuid, gate_id: Uuid) -> Result<()> {
    let account_str = encode_uuid(account_id);
    let gate_str    = encode_uuid(gate_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM employee_gates WHERE account_id = ?1 AND gate_id = ?2",
          rusqlite::params![account_str, gate_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn add_visit(&self, input: NewVisit) -> Result<Visit> {
    let visit = Visit {
      visit_id:    Uuid::new_v4(),
      company_id:  input.company_id,
      purpose:     input.purpose,
      visit_date:  input.visit_date,
      valid_until: input.valid_until,
    };

    let id_str      = encode_uuid(visit.visit_id);
    let company_str = encode_uuid(visit.company_id);
    let purpose     = visit.purpose.clone();
    let date_str    = encode_dt(visit.visit_date);
    let until_str   = encode_dt(visit.valid_until);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO visits (visit_id, company_id, purpose, visit_date, valid_until)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, company_str, purpose, date_str, until_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(visit)
  }

  async fn assign_visit_gate(&self, visit_id: Uuid, gate_id: Uuid) -> Result<()> {
    let visit_str = encode_uuid(visit_id);
    let gate_str  = encode_uuid(gate_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO visit_gates (visit_id, gate_id) VALUES (?1, ?2)",
          rusqlite::params![visit_str, gate_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn add_visit_guest(&self, visit_id: Uuid, account_id: Uuid) -> Result<()> {
    let visit_str   = encode_uuid(visit_id);
    let account_str = encode_uuid(account_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO visit_guests (visit_id, account_id) VALUES (?1, ?2)",
          rusqlite::params![visit_str, account_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn assign_visit_guest_gate(
    &self,
    visit_id: Uuid,
    account_id: Uuid,
    gate_id: Uuid,
  ) -> Result<()> {
    let visit_str   = encode_uuid(visit_id);
    let account_str = encode_uuid(account_id);
    let gate_str    = encode_uuid(gate_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO visit_guest_gates (visit_id, account_id, gate_id)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![visit_str, account_str, gate_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn granted_gates(
    &self,
    account_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Vec<GateGrant>> {
    let account_str = encode_uuid(account_id);
    let now_str     = encode_dt(now);

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT g.gate_id, g.hardware_id FROM gates g
             JOIN employee_gates eg ON eg.gate_id = g.gate_id
             JOIN accounts a ON a.account_id = eg.account_id
            WHERE eg.account_id = ?1 AND a.kind IN ('employee', 'intern')
           UNION
           SELECT g.gate_id, g.hardware_id FROM gates g
             JOIN visit_gates vg ON vg.gate_id = g.gate_id
             JOIN visits v ON v.visit_id = vg.visit_id
             JOIN visit_guests vu ON vu.visit_id = v.visit_id
            WHERE vu.account_id = ?1
              AND v.visit_date <= ?2 AND ?2 <= v.valid_until
           UNION
           SELECT g.gate_id, g.hardware_id FROM gates g
             JOIN visit_guest_gates vgg ON vgg.gate_id = g.gate_id
             JOIN visits v ON v.visit_id = vgg.visit_id
            WHERE vgg.account_id = ?1
              AND v.visit_date <= ?2 AND ?2 <= v.valid_until
           ORDER BY 2",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![account_str, now_str], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(gate_id, hardware_id)| {
        Ok(GateGrant {
          gate_id: decode_uuid(&gate_id)?,
          hardware_id,
        })
      })
      .collect()
  }

  // ── Occupancy + history, transactional ────────────────────────────────────

  async fn apply_tap(&self, transition: TapTransition) -> Result<TapApplied> {
    let mut attempt = 1;
    loop {
      match self.apply_tap_once(transition.clone()).await {
        Err(e) if e.is_busy() && attempt < BUSY_RETRIES => {
          tracing::debug!(attempt, "database busy, retrying tap transition");
          tokio::time::sleep(std::time::Duration::from_millis(25 * u64::from(attempt)))
            .await;
          attempt += 1;
        }
        Err(e) if e.is_busy() => return Err(Error::Busy(attempt)),
        other => return other,
      }
    }
  }

  async fn current_occupancy(&self, account_id: Uuid) -> Result<Option<OccupancyRecord>> {
    let id_str = encode_uuid(account_id);

    let raw: Option<RawOccupancy> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT account_id, gate_id, account_name, gate_name, company_name, card_uid, entered_at
             FROM occupancy WHERE account_id = ?1",
            rusqlite::params![id_str],
            occupancy_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawOccupancy::into_record).transpose()
  }

  async fn clear_occupancy(&self, account_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(account_id);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM occupancy WHERE account_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn append_history(&self, input: NewHistory) -> Result<HistoryRecord> {
    let raw = self
      .conn
      .call(move |conn| {
        // Replays of a keyed event return the original row.
        if let Some(eid) = &input.event_id
          && let Some(existing) = query_history_by_event(conn, eid)?
        {
          return Ok(existing);
        }

        let raw = build_history_row(&input, Utc::now());
        insert_history_row(conn, &raw)?;
        Ok(raw)
      })
      .await?;

    raw.into_record()
  }

  async fn find_history_by_event(&self, event_id: &str) -> Result<Option<HistoryRecord>> {
    let eid = event_id.to_owned();

    let raw: Option<RawHistory> = self
      .conn
      .call(move |conn| query_history_by_event(conn, &eid).map_err(Into::into))
      .await?;

    raw.map(RawHistory::into_record).transpose()
  }

  // ── Violations ────────────────────────────────────────────────────────────

  async fn latest_balance(&self, account_id: Uuid, starting_balance: i64) -> Result<i64> {
    let id_str = encode_uuid(account_id);

    let latest: Option<i64> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT balance_after FROM violations
             WHERE account_id = ?1
             ORDER BY violated_at DESC, rowid DESC LIMIT 1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    Ok(latest.unwrap_or(starting_balance))
  }

  async fn append_violation(
    &self,
    input: NewViolation,
    starting_balance: i64,
  ) -> Result<ViolationRecord> {
    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let account_str = encode_uuid(input.account_id);
        let before: i64 = tx
          .query_row(
            "SELECT balance_after FROM violations
             WHERE account_id = ?1
             ORDER BY violated_at DESC, rowid DESC LIMIT 1",
            rusqlite::params![account_str],
            |row| row.get(0),
          )
          .optional()?
          .unwrap_or(starting_balance);

        // The balance never goes negative: clamp the deduction.
        let deducted = input.points.max(0).min(before);
        let after    = before - deducted;

        let raw = RawViolation {
          violation_id:    encode_uuid(Uuid::new_v4()),
          account_id:      account_str,
          balance_before:  before,
          points_deducted: deducted,
          balance_after:   after,
          description:     input.description.clone(),
          violated_at:     encode_dt(input.violated_at),
          scanned_at:      input.scanned_at.map(encode_dt),
        };

        tx.execute(
          "INSERT INTO violations (
             violation_id, account_id, balance_before, points_deducted,
             balance_after, description, violated_at, scanned_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            raw.violation_id,
            raw.account_id,
            raw.balance_before,
            raw.points_deducted,
            raw.balance_after,
            raw.description,
            raw.violated_at,
            raw.scanned_at,
          ],
        )?;

        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_record()
  }

  async fn consecutive_denials(&self, account_id: Uuid) -> Result<u32> {
    let id_str = encode_uuid(account_id);

    let statuses: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT status FROM history
           WHERE account_id = ?1
           ORDER BY tapped_at DESC, synced_at DESC LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, DENIAL_SCAN_LIMIT], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(statuses.iter().take_while(|s| s.as_str() == "denied").count() as u32)
  }

  // ── Dashboard reads ───────────────────────────────────────────────────────

  async fn recent_history(&self, limit: u32) -> Result<Vec<HistoryRecord>> {
    let limit = i64::from(limit);

    let raws: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT history_id, event_id, account_id, gate_id, card_uid,
                  account_name, gate_name, company_name, status, message,
                  tapped_at, synced_at
           FROM history
           ORDER BY tapped_at DESC, synced_at DESC LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit], history_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistory::into_record).collect()
  }

  async fn success_counts_today(&self, now: DateTime<Utc>) -> Result<Vec<KindCount>> {
    let day_start = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let day_end   = day_start + ChronoDuration::days(1);
    let start_str = encode_dt(day_start);
    let end_str   = encode_dt(day_end);

    let rows: Vec<(String, u32)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT a.kind, COUNT(*) FROM history h
             JOIN accounts a ON a.account_id = h.account_id
            WHERE h.status = 'success'
              AND h.tapped_at >= ?1 AND h.tapped_at < ?2
            GROUP BY a.kind ORDER BY a.kind",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![start_str, end_str], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(kind, count)| {
        Ok(KindCount {
          kind: decode_account_kind(&kind)?,
          count,
        })
      })
      .collect()
  }

  async fn occupancy_by_gate(&self) -> Result<Vec<GateHeadcount>> {
    let rows: Vec<(String, String, u32)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT gate_id, gate_name, COUNT(*) FROM occupancy
           GROUP BY gate_id, gate_name ORDER BY gate_name",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(gate_id, gate_name, count)| {
        Ok(GateHeadcount {
          gate_id: decode_uuid(&gate_id)?,
          gate_name,
          count,
        })
      })
      .collect()
  }

  async fn list_occupancy(&self) -> Result<Vec<OccupancyRecord>> {
    let raws: Vec<RawOccupancy> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT account_id, gate_id, account_name, gate_name, company_name, card_uid, entered_at
           FROM occupancy ORDER BY entered_at",
        )?;
        let rows = stmt
          .query_map([], occupancy_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOccupancy::into_record).collect()
  }
}

// ─── Tap transition internals ────────────────────────────────────────────────

impl SqliteStore {
  /// One attempt at the tap transition. The whole read-check-write sequence
  /// runs inside an immediate transaction so two concurrent taps can never
  /// both observe "no occupancy" for the same account.
  async fn apply_tap_once(&self, t: TapTransition) -> Result<TapApplied> {
    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Idempotency: a replayed event id returns the original audit row
        // without touching occupancy.
        if let Some(eid) = &t.event_id
          && let Some(existing) = query_history_by_event(&tx, eid)?
        {
          tx.commit()?;
          return Ok(RawApplied::AlreadyRecorded { history: existing });
        }

        let account_str = encode_uuid(t.account_id);
        let gate_str    = encode_uuid(t.gate_id);
        let now_str     = encode_dt(t.tapped_at);

        // Grant re-check inside the transaction. The caller authorized
        // against a snapshot it read earlier; a grant revoked (or a visit
        // window closed) since then must not admit this tap.
        let granted: bool = tx.query_row(
          "SELECT EXISTS (
             SELECT 1 FROM employee_gates eg
               JOIN accounts a ON a.account_id = eg.account_id
              WHERE eg.account_id = ?1 AND eg.gate_id = ?2
                AND a.kind IN ('employee', 'intern')
             UNION ALL
             SELECT 1 FROM visit_gates vg
               JOIN visits v ON v.visit_id = vg.visit_id
               JOIN visit_guests vu ON vu.visit_id = v.visit_id
              WHERE vu.account_id = ?1 AND vg.gate_id = ?2
                AND v.visit_date <= ?3 AND ?3 <= v.valid_until
             UNION ALL
             SELECT 1 FROM visit_guest_gates vgg
               JOIN visits v ON v.visit_id = vgg.visit_id
              WHERE vgg.account_id = ?1 AND vgg.gate_id = ?2
                AND v.visit_date <= ?3 AND ?3 <= v.valid_until
           )",
          rusqlite::params![account_str, gate_str, now_str],
          |row| row.get(0),
        )?;
        if !granted {
          let history = build_history_row(
            &NewHistory {
              event_id:     t.event_id.clone(),
              account_id:   Some(t.account_id),
              gate_id:      Some(t.gate_id),
              card_uid:     t.snapshot.card_uid.clone(),
              account_name: Some(t.snapshot.account_name.clone()),
              gate_name:    Some(t.snapshot.gate_name.clone()),
              company_name: Some(t.snapshot.company_name.clone()),
              status:       HistoryStatus::Denied,
              message:      DenyReason::NotAuthorized.message().to_owned(),
              tapped_at:    t.tapped_at,
            },
            Utc::now(),
          );
          insert_history_row(&tx, &history)?;
          tx.commit()?;
          return Ok(RawApplied::NotGranted { history });
        }

        let existing: Option<(String, String)> = tx
          .query_row(
            "SELECT gate_id, gate_name FROM occupancy WHERE account_id = ?1",
            rusqlite::params![account_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;

        let (effect, message) = match existing {
          // No record: this tap is an entry.
          None => {
            insert_occupancy_row(&tx, &t, &account_str, &gate_str)?;
            (RawEffect::Entered, format!("entry at {}", t.snapshot.gate_name))
          }

          // Same gate: the account is leaving through the checkpoint it
          // entered.
          Some((current_gate, _)) if current_gate == gate_str => {
            tx.execute(
              "DELETE FROM occupancy WHERE account_id = ?1",
              rusqlite::params![account_str],
            )?;
            (RawEffect::Exited, format!("exit at {}", t.snapshot.gate_name))
          }

          // Different gate: apply the configured relocation policy.
          Some((current_gate, current_gate_name)) => match t.policy {
            RelocationPolicy::Relocate => {
              tx.execute(
                "DELETE FROM occupancy WHERE account_id = ?1",
                rusqlite::params![account_str],
              )?;
              insert_occupancy_row(&tx, &t, &account_str, &gate_str)?;
              (
                RawEffect::Relocated { from_gate_id: current_gate },
                format!(
                  "relocated to {} from {}",
                  t.snapshot.gate_name, current_gate_name
                ),
              )
            }
            RelocationPolicy::Deny => {
              let history = build_history_row(
                &NewHistory {
                  event_id:     t.event_id.clone(),
                  account_id:   Some(t.account_id),
                  gate_id:      Some(t.gate_id),
                  card_uid:     t.snapshot.card_uid.clone(),
                  account_name: Some(t.snapshot.account_name.clone()),
                  gate_name:    Some(t.snapshot.gate_name.clone()),
                  company_name: Some(t.snapshot.company_name.clone()),
                  status:       HistoryStatus::Denied,
                  message:      DenyReason::OccupiedElsewhere.message().to_owned(),
                  tapped_at:    t.tapped_at,
                },
                Utc::now(),
              );
              insert_history_row(&tx, &history)?;
              tx.commit()?;
              return Ok(RawApplied::OccupiedElsewhere {
                at_gate_id: current_gate,
                history,
              });
            }
          },
        };

        let history = build_history_row(
          &NewHistory {
            event_id:     t.event_id.clone(),
            account_id:   Some(t.account_id),
            gate_id:      Some(t.gate_id),
            card_uid:     t.snapshot.card_uid.clone(),
            account_name: Some(t.snapshot.account_name.clone()),
            gate_name:    Some(t.snapshot.gate_name.clone()),
            company_name: Some(t.snapshot.company_name.clone()),
            status:       HistoryStatus::Success,
            message:      message.clone(),
            tapped_at:    t.tapped_at,
          },
          Utc::now(),
        );
        insert_history_row(&tx, &history)?;

        tx.commit()?;
        Ok(RawApplied::Applied { effect, history })
      })
      .await?;

    match raw {
      RawApplied::Applied { effect, history } => Ok(TapApplied::Applied {
        effect:  decode_effect(effect)?,
        history: history.into_record()?,
      }),
      RawApplied::NotGranted { history } => Ok(TapApplied::NotGranted {
        history: history.into_record()?,
      }),
      RawApplied::OccupiedElsewhere { at_gate_id, history } => {
        Ok(TapApplied::OccupiedElsewhere {
          at_gate_id: decode_uuid(&at_gate_id)?,
          history:    history.into_record()?,
        })
      }
      RawApplied::AlreadyRecorded { history } => Ok(TapApplied::AlreadyRecorded {
        history: history.into_record()?,
      }),
    }
  }
}

fn decode_effect(raw: RawEffect) -> Result<TransitionEffect> {
  Ok(match raw {
    RawEffect::Entered => TransitionEffect::Entered,
    RawEffect::Exited => TransitionEffect::Exited,
    RawEffect::Relocated { from_gate_id } => TransitionEffect::Relocated {
      from_gate_id: decode_uuid(&from_gate_id)?,
    },
  })
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn account_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAccount> {
  Ok(RawAccount {
    account_id:   row.get(0)?,
    card_uid:     row.get(1)?,
    display_name: row.get(2)?,
    kind:         row.get(3)?,
    company_id:   row.get(4)?,
    active:       row.get(5)?,
    created_at:   row.get(6)?,
  })
}

fn gate_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawGate> {
  Ok(RawGate {
    gate_id:     row.get(0)?,
    name:        row.get(1)?,
    hardware_id: row.get(2)?,
    location_id: row.get(3)?,
    kind:        row.get(4)?,
    active:      row.get(5)?,
    created_at:  row.get(6)?,
  })
}

fn occupancy_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawOccupancy> {
  Ok(RawOccupancy {
    account_id:   row.get(0)?,
    gate_id:      row.get(1)?,
    account_name: row.get(2)?,
    gate_name:    row.get(3)?,
    company_name: row.get(4)?,
    card_uid:     row.get(5)?,
    entered_at:   row.get(6)?,
  })
}

fn history_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawHistory> {
  Ok(RawHistory {
    history_id:   row.get(0)?,
    event_id:     row.get(1)?,
    account_id:   row.get(2)?,
    gate_id:      row.get(3)?,
    card_uid:     row.get(4)?,
    account_name: row.get(5)?,
    gate_name:    row.get(6)?,
    company_name: row.get(7)?,
    status:       row.get(8)?,
    message:      row.get(9)?,
    tapped_at:    row.get(10)?,
    synced_at:    row.get(11)?,
  })
}

fn query_history_by_event(
  conn: &rusqlite::Connection,
  event_id: &str,
) -> rusqlite::Result<Option<RawHistory>> {
  conn
    .query_row(
      "SELECT history_id, event_id, account_id, gate_id, card_uid,
              account_name, gate_name, company_name, status, message,
              tapped_at, synced_at
       FROM history WHERE event_id = ?1",
      rusqlite::params![event_id],
      history_row,
    )
    .optional()
}

/// Build the column form of a history row; `history_id` and `synced_at` are
/// assigned here.
fn build_history_row(input: &NewHistory, synced_at: DateTime<Utc>) -> RawHistory {
  RawHistory {
    history_id:   encode_uuid(Uuid::new_v4()),
    event_id:     input.event_id.clone(),
    account_id:   input.account_id.map(encode_uuid),
    gate_id:      input.gate_id.map(encode_uuid),
    card_uid:     input.card_uid.clone(),
    account_name: input.account_name.clone(),
    gate_name:    input.gate_name.clone(),
    company_name: input.company_name.clone(),
    status:       encode_history_status(input.status).to_owned(),
    message:      input.message.clone(),
    tapped_at:    encode_dt(input.tapped_at),
    synced_at:    encode_dt(synced_at),
  }
}

fn insert_history_row(
  conn: &rusqlite::Connection,
  raw: &RawHistory,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO history (
       history_id, event_id, account_id, gate_id, card_uid,
       account_name, gate_name, company_name, status, message,
       tapped_at, synced_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    rusqlite::params![
      raw.history_id,
      raw.event_id,
      raw.account_id,
      raw.gate_id,
      raw.card_uid,
      raw.account_name,
      raw.gate_name,
      raw.company_name,
      raw.status,
      raw.message,
      raw.tapped_at,
      raw.synced_at,
    ],
  )?;
  Ok(())
}

fn insert_occupancy_row(
  conn: &rusqlite::Connection,
  t: &TapTransition,
  account_str: &str,
  gate_str: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO occupancy (
       account_id, gate_id, account_name, gate_name, company_name,
       card_uid, entered_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      account_str,
      gate_str,
      t.snapshot.account_name,
      t.snapshot.gate_name,
      t.snapshot.company_name,
      t.snapshot.card_uid,
      encode_dt(t.tapped_at),
    ],
  )?;
  Ok(())
}

/// Translate a UNIQUE-constraint failure on `accounts.card_uid` into the
/// domain error.
fn map_card_conflict(e: Error, card_uid: Option<&str>) -> Error {
  if let Some(card) = card_uid
    && let Error::Database(tokio_rusqlite::Error::Rusqlite(
      rusqlite::Error::SqliteFailure(f, _),
    )) = &e
    && f.code == rusqlite::ErrorCode::ConstraintViolation
  {
    return Error::CardUidTaken(card.to_owned());
  }
  e
}
