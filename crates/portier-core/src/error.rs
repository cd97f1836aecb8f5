//! Error types for `portier-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("account not found: {0}")]
  AccountNotFound(Uuid),

  #[error("gate not found: {0}")]
  GateNotFound(Uuid),

  #[error("location not found: {0}")]
  LocationNotFound(Uuid),

  #[error("company not found: {0}")]
  CompanyNotFound(Uuid),

  #[error("visit not found: {0}")]
  VisitNotFound(Uuid),

  #[error("card uid {0:?} is already assigned")]
  CardUidTaken(String),

  #[error("unknown discriminant: {0:?}")]
  UnknownDiscriminant(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
