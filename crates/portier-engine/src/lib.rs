//! Tap-processing engine for Portier.
//!
//! Orchestrates the access directory, the occupancy transition, the audit
//! trail, and the violation policy on every tap. Generic over any
//! [`portier_core::store::AccessStore`] backend.

pub mod directory;
pub mod locks;
pub mod policy;
pub mod processor;

pub use processor::{ProcessorConfig, TapProcessor};
