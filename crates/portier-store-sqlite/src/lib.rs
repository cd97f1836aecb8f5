//! SQLite backend for the Portier access store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The single connection also serializes
//! writers, and the tap-transition path additionally runs inside an immediate
//! transaction so the one-occupancy-per-account invariant holds even with a
//! second process on the same database file.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
