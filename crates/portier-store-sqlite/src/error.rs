//! Error type for `portier-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] portier_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("account not found: {0}")]
  AccountNotFound(uuid::Uuid),

  #[error("gate not found: {0}")]
  GateNotFound(uuid::Uuid),

  #[error("location not found: {0}")]
  LocationNotFound(uuid::Uuid),

  #[error("visit not found: {0}")]
  VisitNotFound(uuid::Uuid),

  #[error("card uid {0:?} is already assigned")]
  CardUidTaken(String),

  /// The database stayed busy through every retry attempt.
  #[error("database busy after {0} attempts")]
  Busy(u32),
}

impl Error {
  /// Whether the underlying SQLite error is a transient lock/busy condition
  /// worth retrying.
  pub fn is_busy(&self) -> bool {
    match self {
      Error::Database(tokio_rusqlite::Error::Rusqlite(
        rusqlite::Error::SqliteFailure(e, _),
      )) => matches!(
        e.code,
        rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
      ),
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
