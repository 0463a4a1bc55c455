//! Capture session: the aggregate a submission is built from
//!
//! One [`CaptureSession`] exists per registration attempt. The UI layer and
//! the rotation pump mutate it concurrently through [`SharedSession`]; the
//! submission workflow only ever consumes an immutable [`SessionSnapshot`],
//! so an attempt in flight is never affected by later mutations.

use crate::rotation::{RotationAccumulator, RotationSample};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use veriloc_common::config::CaptureConfig;
use veriloc_common::events::{CaptureEvent, EventBus};
use veriloc_common::{Coordinate, Error, MediaRef, MissingField, Result};

/// Derived session status; never set directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Incomplete,
    Ready,
}

/// Immutable copy of the session fields a submission attempt needs.
///
/// Taken at the moment submission begins; later live mutations (the user
/// keeps rotating, clears media, ...) never alter an attempt in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    /// Generated once per session; reused across retries so the backend can
    /// de-duplicate repeated attempts
    pub idempotency_key: Uuid,
    pub coordinate: Coordinate,
    pub address: String,
    pub media: MediaRef,
    pub accumulated_degrees: f64,
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

/// Mutable state for one location-registration attempt
#[derive(Debug)]
pub struct CaptureSession {
    id: Uuid,
    idempotency_key: Uuid,
    coordinate: Option<Coordinate>,
    selected_address: Option<String>,
    rotation: RotationAccumulator,
    media: Option<MediaRef>,
    required_fraction: f64,
    bus: EventBus,
    was_ready: bool,
    last_progress_degrees: f64,
}

impl CaptureSession {
    pub fn new(config: &CaptureConfig, bus: EventBus) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(session_id = %id, "Capture session created");
        Self {
            id,
            idempotency_key: Uuid::new_v4(),
            coordinate: None,
            selected_address: None,
            rotation: RotationAccumulator::new(config.rotation.clone()),
            media: None,
            required_fraction: config.rotation.required_fraction,
            bus,
            was_ready: false,
            last_progress_degrees: 0.0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn idempotency_key(&self) -> Uuid {
        self.idempotency_key
    }

    /// Set the selected coordinate, canonically rounded to 6 decimal places
    pub fn set_coordinate(&mut self, coordinate: Coordinate) {
        let rounded = coordinate.rounded();
        self.coordinate = Some(rounded);
        self.bus.emit_lossy(CaptureEvent::CoordinateChanged {
            session_id: self.id,
            latitude: rounded.latitude,
            longitude: rounded.longitude,
            timestamp: Utc::now(),
        });
        self.rederive_status();
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        self.coordinate
    }

    /// Set the human-readable address the user picked
    pub fn set_address(&mut self, address: impl Into<String>) {
        let address = address.into();
        self.bus.emit_lossy(CaptureEvent::AddressSelected {
            session_id: self.id,
            address: address.clone(),
            timestamp: Utc::now(),
        });
        self.selected_address = Some(address);
        self.rederive_status();
    }

    pub fn selected_address(&self) -> Option<&str> {
        self.selected_address.as_deref()
    }

    pub fn attach_media(&mut self, media: MediaRef) {
        self.bus.emit_lossy(CaptureEvent::MediaAttached {
            session_id: self.id,
            uri: media.uri.clone(),
            timestamp: Utc::now(),
        });
        self.media = Some(media);
        self.rederive_status();
    }

    pub fn clear_media(&mut self) {
        self.media = None;
        self.bus.emit_lossy(CaptureEvent::MediaCleared {
            session_id: self.id,
            timestamp: Utc::now(),
        });
        self.rederive_status();
    }

    /// Feed one gyroscope sample; returns the degrees it contributed.
    ///
    /// Progress events are throttled to whole-degree advances so a 10 Hz
    /// sample stream does not flood the bus.
    pub fn ingest_rotation(&mut self, sample: RotationSample) -> f64 {
        let contribution = self.rotation.ingest(sample);
        if contribution > 0.0 {
            let degrees = self.rotation.accumulated_degrees();
            if degrees - self.last_progress_degrees >= 1.0 {
                self.last_progress_degrees = degrees;
                self.bus.emit_lossy(CaptureEvent::RotationProgress {
                    session_id: self.id,
                    accumulated_degrees: degrees,
                    fraction: self.rotation.progress_fraction(),
                    timestamp: Utc::now(),
                });
            }
            self.rederive_status();
        }
        contribution
    }

    pub fn progress_fraction(&self) -> f64 {
        self.rotation.progress_fraction()
    }

    /// Preconditions still unmet, in checklist order
    pub fn missing_fields(&self) -> Vec<MissingField> {
        let mut missing = Vec::new();
        if self.coordinate.is_none() {
            missing.push(MissingField::Coordinate);
        }
        if self
            .selected_address
            .as_deref()
            .map_or(true, |a| a.trim().is_empty())
        {
            missing.push(MissingField::Address);
        }
        if self.rotation.progress_fraction() < self.required_fraction {
            missing.push(MissingField::Rotation);
        }
        if self.media.is_none() {
            missing.push(MissingField::Media);
        }
        missing
    }

    /// Derived status: `Ready` iff every precondition holds
    pub fn status(&self) -> SessionStatus {
        if self.missing_fields().is_empty() {
            SessionStatus::Ready
        } else {
            SessionStatus::Incomplete
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    /// Immutable copy for a submission attempt.
    ///
    /// Performs a fresh readiness check first, since readiness can regress
    /// between the UI enabling submission and the user tapping it.
    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(Error::NotReady { missing });
        }
        Ok(SessionSnapshot {
            session_id: self.id,
            idempotency_key: self.idempotency_key,
            coordinate: self.coordinate.expect("checked by missing_fields"),
            address: self
                .selected_address
                .clone()
                .expect("checked by missing_fields"),
            media: self.media.clone().expect("checked by missing_fields"),
            accumulated_degrees: self.rotation.accumulated_degrees(),
            taken_at: Utc::now(),
        })
    }

    /// Restart the registration: clears all fields, zeroes rotation, and
    /// issues a NEW idempotency key (a reset begins a new logical
    /// submission, which the backend must not de-duplicate away).
    pub fn reset(&mut self) {
        tracing::info!(session_id = %self.id, "Capture session reset");
        self.coordinate = None;
        self.selected_address = None;
        self.media = None;
        self.rotation.reset();
        self.last_progress_degrees = 0.0;
        self.idempotency_key = Uuid::new_v4();
        self.rederive_status();
    }

    fn rederive_status(&mut self) {
        let ready = self.missing_fields().is_empty();
        if ready != self.was_ready {
            self.was_ready = ready;
            self.bus.emit_lossy(CaptureEvent::ReadinessChanged {
                session_id: self.id,
                ready,
                timestamp: Utc::now(),
            });
        }
    }
}

/// Shared handle to a capture session.
///
/// UI, rotation pump, and workflow each hold a clone; mutations serialize
/// through the inner lock.
#[derive(Debug, Clone)]
pub struct SharedSession {
    inner: Arc<RwLock<CaptureSession>>,
}

impl SharedSession {
    pub fn new(config: &CaptureConfig, bus: EventBus) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CaptureSession::new(config, bus))),
        }
    }

    pub async fn id(&self) -> Uuid {
        self.inner.read().await.id()
    }

    pub async fn idempotency_key(&self) -> Uuid {
        self.inner.read().await.idempotency_key()
    }

    pub async fn set_coordinate(&self, coordinate: Coordinate) {
        self.inner.write().await.set_coordinate(coordinate);
    }

    pub async fn coordinate(&self) -> Option<Coordinate> {
        self.inner.read().await.coordinate()
    }

    pub async fn set_address(&self, address: impl Into<String>) {
        self.inner.write().await.set_address(address);
    }

    pub async fn selected_address(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .selected_address()
            .map(str::to_owned)
    }

    pub async fn attach_media(&self, media: MediaRef) {
        self.inner.write().await.attach_media(media);
    }

    pub async fn clear_media(&self) {
        self.inner.write().await.clear_media();
    }

    pub async fn ingest_rotation(&self, sample: RotationSample) -> f64 {
        self.inner.write().await.ingest_rotation(sample)
    }

    pub async fn progress_fraction(&self) -> f64 {
        self.inner.read().await.progress_fraction()
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.read().await.status()
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.read().await.is_ready()
    }

    pub async fn missing_fields(&self) -> Vec<MissingField> {
        self.inner.read().await.missing_fields()
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.inner.read().await.snapshot()
    }

    pub async fn reset(&self) {
        self.inner.write().await.reset();
    }
}
