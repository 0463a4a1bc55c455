//! Common error types for the veriloc pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for veriloc operations
pub type Result<T> = std::result::Result<T, Error>;

/// A submission precondition that has not been satisfied yet.
///
/// Surfaced inside [`Error::NotReady`] so callers can render a checklist of
/// what the user still has to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingField {
    /// No coordinate has been selected
    Coordinate,
    /// No address has been selected (or it is empty)
    Address,
    /// Rotation coverage is below the required fraction
    Rotation,
    /// No media evidence has been attached
    Media,
}

impl std::fmt::Display for MissingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingField::Coordinate => write!(f, "coordinate"),
            MissingField::Address => write!(f, "address"),
            MissingField::Rotation => write!(f, "rotation"),
            MissingField::Media => write!(f, "media"),
        }
    }
}

/// Error taxonomy for the capture and submission pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Geocoding produced no match for the query (user can retry the query)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport error or provider outage (retryable by the caller)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Submission requested before the session preconditions were met
    #[error("Session not ready: missing {}", format_missing(.missing))]
    NotReady {
        /// Preconditions still unmet, in checklist order
        missing: Vec<MissingField>,
    },

    /// Challenge not passed, expired, or the token was rejected server-side
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Server rejected the payload; reason is surfaced verbatim
    #[error("Submission rejected: {0}")]
    ValidationRejected(String),

    /// Network failure, timeout, or 5xx-class response (retried automatically)
    #[error("Transient submission failure: {0}")]
    TransientSubmissionFailure(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_missing(missing: &[MissingField]) -> String {
    missing
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// True for failures that automatic retry may resolve
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientSubmissionFailure(_))
    }
}
