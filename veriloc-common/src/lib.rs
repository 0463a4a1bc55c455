//! # Veriloc Common Library
//!
//! Shared code for the veriloc location capture pipeline:
//! - Error taxonomy (Error enum, Result alias)
//! - Core data types (Coordinate, PlaceCandidate, MediaRef, ...)
//! - Configuration loading
//! - Event types and EventBus

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, MissingField, Result};
pub use types::{Coordinate, Identity, MediaRef, PlaceCandidate, SubmissionReceipt};
