//! Core data types shared across the capture pipeline

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A point on the Earth's surface in signed decimal degrees.
///
/// Latitude must lie in [-90, 90] and longitude in [-180, 180]; values
/// outside range are rejected, never clamped. Coordinates are canonically
/// rounded to 6 decimal places (~11 cm) when they enter a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range values
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidInput(format!(
                "latitude out of range: {}",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidInput(format!(
                "longitude out of range: {}",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Canonical form: both components rounded to 6 decimal places
    pub fn rounded(&self) -> Self {
        const SCALE: f64 = 1_000_000.0;
        Self {
            latitude: (self.latitude * SCALE).round() / SCALE,
            longitude: (self.longitude * SCALE).round() / SCALE,
        }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// One reverse-geocoding result for a coordinate.
///
/// Candidates arrive ordered by provider relevance; that order is preserved
/// throughout the pipeline, never re-sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
}

impl PlaceCandidate {
    /// Human-readable address: the non-empty parts joined with ", "
    pub fn display_address(&self) -> String {
        [
            &self.name,
            &self.street,
            &self.city,
            &self.region,
            &self.postal_code,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Opaque handle to captured media evidence.
///
/// The pipeline never inspects media bytes; it only forwards the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// URI or platform handle supplied by the capture surface
    pub uri: String,
    /// MIME type reported by the capture surface (e.g. "video/mp4")
    pub content_type: String,
}

impl MediaRef {
    pub fn new(uri: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            content_type: content_type.into(),
        }
    }
}

/// Caller-supplied identity for the submitting user.
///
/// Supplied opaquely by the embedding application; the pipeline does not
/// fetch or store credentials itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub auth_token: Option<String>,
}

/// Backend acknowledgement of an accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    /// Identifier of the stored location record
    pub record_id: String,
    /// Server message, if any
    #[serde(default)]
    pub message: String,
}
