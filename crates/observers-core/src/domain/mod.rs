//! Domain models for observers.
//!
//! Canonical definitions for the core entities:
//! - `Observation`: a reviewer's finding and its lifecycle
//! - `Severity`, `Status`, `SourceType`: the fixed classifications
//! - `ObservationError`: the error taxonomy shared by every operation

pub mod error;
pub mod observation;

// Re-export main types and errors
pub use error::{ObservationError, Result};
pub use observation::{NewObservation, Observation, Severity, SourceType, Status};
