//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings (which compare correctly as
//! text for rows written by this store). Enums are stored as their lowercase
//! discriminants. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use portier_core::{
  account::{Account, AccountKind, Company},
  gate::{Gate, GateKind, Location},
  history::{HistoryRecord, HistoryStatus},
  occupancy::{OccupancyRecord, OccupancySnapshot},
  violation::ViolationRecord,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── AccountKind ─────────────────────────────────────────────────────────────

pub fn encode_account_kind(k: AccountKind) -> &'static str {
  match k {
    AccountKind::Employee => "employee",
    AccountKind::Intern => "intern",
    AccountKind::Guest => "guest",
  }
}

pub fn decode_account_kind(s: &str) -> Result<AccountKind> {
  match s {
    "employee" => Ok(AccountKind::Employee),
    "intern" => Ok(AccountKind::Intern),
    "guest" => Ok(AccountKind::Guest),
    other => Err(Error::Core(portier_core::Error::UnknownDiscriminant(
      other.to_owned(),
    ))),
  }
}

// ─── GateKind ────────────────────────────────────────────────────────────────

pub fn encode_gate_kind(k: GateKind) -> &'static str {
  match k {
    GateKind::Physical => "physical",
    GateKind::Portable => "portable",
  }
}

pub fn decode_gate_kind(s: &str) -> Result<GateKind> {
  match s {
    "physical" => Ok(GateKind::Physical),
    "portable" => Ok(GateKind::Portable),
    other => Err(Error::Core(portier_core::Error::UnknownDiscriminant(
      other.to_owned(),
    ))),
  }
}

// ─── HistoryStatus ───────────────────────────────────────────────────────────

pub fn encode_history_status(s: HistoryStatus) -> &'static str {
  match s {
    HistoryStatus::Success => "success",
    HistoryStatus::Denied => "denied",
  }
}

pub fn decode_history_status(s: &str) -> Result<HistoryStatus> {
  match s {
    "success" => Ok(HistoryStatus::Success),
    "denied" => Ok(HistoryStatus::Denied),
    other => Err(Error::Core(portier_core::Error::UnknownDiscriminant(
      other.to_owned(),
    ))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `companies` row.
pub struct RawCompany {
  pub company_id: String,
  pub name:       String,
  pub created_at: String,
}

impl RawCompany {
  pub fn into_company(self) -> Result<Company> {
    Ok(Company {
      company_id: decode_uuid(&self.company_id)?,
      name:       self.name,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `locations` row.
pub struct RawLocation {
  pub location_id: String,
  pub name:        String,
  pub active:      bool,
  pub created_at:  String,
}

impl RawLocation {
  pub fn into_location(self) -> Result<Location> {
    Ok(Location {
      location_id: decode_uuid(&self.location_id)?,
      name:        self.name,
      active:      self.active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `gates` row.
pub struct RawGate {
  pub gate_id:     String,
  pub name:        String,
  pub hardware_id: i64,
  pub location_id: String,
  pub kind:        String,
  pub active:      bool,
  pub created_at:  String,
}

impl RawGate {
  pub fn into_gate(self) -> Result<Gate> {
    Ok(Gate {
      gate_id:     decode_uuid(&self.gate_id)?,
      name:        self.name,
      hardware_id: self.hardware_id,
      location_id: decode_uuid(&self.location_id)?,
      kind:        decode_gate_kind(&self.kind)?,
      active:      self.active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `accounts` row.
pub struct RawAccount {
  pub account_id:   String,
  pub card_uid:     Option<String>,
  pub display_name: String,
  pub kind:         String,
  pub company_id:   String,
  pub active:       bool,
  pub created_at:   String,
}

impl RawAccount {
  pub fn into_account(self) -> Result<Account> {
    Ok(Account {
      account_id:   decode_uuid(&self.account_id)?,
      card_uid:     self.card_uid,
      display_name: self.display_name,
      kind:         decode_account_kind(&self.kind)?,
      company_id:   decode_uuid(&self.company_id)?,
      active:       self.active,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `occupancy` row.
pub struct RawOccupancy {
  pub account_id:   String,
  pub gate_id:      String,
  pub account_name: String,
  pub gate_name:    String,
  pub company_name: String,
  pub card_uid:     String,
  pub entered_at:   String,
}

impl RawOccupancy {
  pub fn into_record(self) -> Result<OccupancyRecord> {
    Ok(OccupancyRecord {
      account_id: decode_uuid(&self.account_id)?,
      gate_id:    decode_uuid(&self.gate_id)?,
      snapshot:   OccupancySnapshot {
        account_name: self.account_name,
        gate_name:    self.gate_name,
        company_name: self.company_name,
        card_uid:     self.card_uid,
      },
      entered_at: decode_dt(&self.entered_at)?,
    })
  }
}

/// Raw strings read directly from a `history` row.
pub struct RawHistory {
  pub history_id:   String,
  pub event_id:     Option<String>,
  pub account_id:   Option<String>,
  pub gate_id:      Option<String>,
  pub card_uid:     String,
  pub account_name: Option<String>,
  pub gate_name:    Option<String>,
  pub company_name: Option<String>,
  pub status:       String,
  pub message:      String,
  pub tapped_at:    String,
  pub synced_at:    String,
}

impl RawHistory {
  pub fn into_record(self) -> Result<HistoryRecord> {
    Ok(HistoryRecord {
      history_id:   decode_uuid(&self.history_id)?,
      event_id:     self.event_id,
      account_id:   self.account_id.as_deref().map(decode_uuid).transpose()?,
      gate_id:      self.gate_id.as_deref().map(decode_uuid).transpose()?,
      card_uid:     self.card_uid,
      account_name: self.account_name,
      gate_name:    self.gate_name,
      company_name: self.company_name,
      status:       decode_history_status(&self.status)?,
      message:      self.message,
      tapped_at:    decode_dt(&self.tapped_at)?,
      synced_at:    decode_dt(&self.synced_at)?,
    })
  }
}

/// Raw strings read directly from a `violations` row.
pub struct RawViolation {
  pub violation_id:    String,
  pub account_id:      String,
  pub balance_before:  i64,
  pub points_deducted: i64,
  pub balance_after:   i64,
  pub description:     String,
  pub violated_at:     String,
  pub scanned_at:      Option<String>,
}

impl RawViolation {
  pub fn into_record(self) -> Result<ViolationRecord> {
    Ok(ViolationRecord {
      violation_id:    decode_uuid(&self.violation_id)?,
      account_id:      decode_uuid(&self.account_id)?,
      balance_before:  self.balance_before,
      points_deducted: self.points_deducted,
      balance_after:   self.balance_after,
      description:     self.description,
      violated_at:     decode_dt(&self.violated_at)?,
      scanned_at:      self.scanned_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
