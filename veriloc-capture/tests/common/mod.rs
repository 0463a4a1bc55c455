//! Shared test fixtures: scripted provider ports and session builders
//!
//! Not every suite uses every fixture.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;
use veriloc_capture::backend::{ChallengeProvider, SubmissionBackend, VerificationToken};
use veriloc_capture::geo::GeocodingProvider;
use veriloc_capture::rotation::RotationSample;
use veriloc_capture::session::SharedSession;
use veriloc_common::config::{CaptureConfig, SubmissionConfig};
use veriloc_common::events::EventBus;
use veriloc_common::{
    Coordinate, Error, Identity, MediaRef, PlaceCandidate, Result, SubmissionReceipt,
};

/// Submission policy with retry delays suitable for tests
pub fn fast_submission_config() -> SubmissionConfig {
    SubmissionConfig {
        max_retries: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        request_timeout_ms: 2_000,
        challenge_timeout_ms: 2_000,
    }
}

pub fn test_identity() -> Identity {
    Identity {
        user_id: "user-7".into(),
        auth_token: Some("jwt-abc".into()),
    }
}

/// Session with every submission precondition satisfied
pub async fn ready_session(bus: EventBus) -> SharedSession {
    let session = SharedSession::new(&CaptureConfig::default(), bus);
    session
        .set_coordinate(Coordinate::new(2.981566, 101.667885).unwrap())
        .await;
    session.set_address("12, Jalan Besar, Ipoh, Perak, 31650").await;
    session
        .attach_media(MediaRef::new("file:///tmp/evidence.mp4", "video/mp4"))
        .await;
    // One full turn at 90 deg/s
    for i in 0..=41 {
        session
            .ingest_rotation(RotationSample::new(0.0, 0.0, FRAC_PI_2, i * 100))
            .await;
    }
    assert!(session.is_ready().await);
    session
}

/// Challenge provider with a call counter, optional failure, and an optional
/// gate that holds `open` until released
pub struct MockChallenge {
    pub opens: AtomicU32,
    pub fail: bool,
    pub gate: Option<Arc<Notify>>,
}

impl MockChallenge {
    pub fn passing() -> Self {
        Self {
            opens: AtomicU32::new(0),
            fail: false,
            gate: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            opens: AtomicU32::new(0),
            fail: true,
            gate: None,
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            opens: AtomicU32::new(0),
            fail: false,
            gate: Some(gate),
        }
    }

    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChallengeProvider for MockChallenge {
    async fn open(&self) -> Result<VerificationToken> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            Err(Error::VerificationFailed("challenge dismissed".into()))
        } else {
            Ok(VerificationToken::new("tok-test"))
        }
    }
}

/// Backend with scripted verify/submit behavior and full call recording
pub struct MockBackend {
    pub verify_calls: AtomicU32,
    pub verify_fail: bool,
    pub submit_calls: AtomicU32,
    /// Number of leading submit calls that fail transiently
    pub transient_failures: u32,
    /// Number of leading submit calls that never resolve
    pub hanging_submits: u32,
    /// When set, every submit is rejected with this reason (4xx)
    pub validation_reject: Option<String>,
    pub keys_seen: std::sync::Mutex<Vec<Uuid>>,
}

impl MockBackend {
    pub fn accepting() -> Self {
        Self {
            verify_calls: AtomicU32::new(0),
            verify_fail: false,
            submit_calls: AtomicU32::new(0),
            transient_failures: 0,
            hanging_submits: 0,
            validation_reject: None,
            keys_seen: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_verification() -> Self {
        Self {
            verify_fail: true,
            ..Self::accepting()
        }
    }

    pub fn flaky(transient_failures: u32) -> Self {
        Self {
            transient_failures,
            ..Self::accepting()
        }
    }

    pub fn rejecting_payload(reason: &str) -> Self {
        Self {
            validation_reject: Some(reason.to_string()),
            ..Self::accepting()
        }
    }

    pub fn hanging(hanging_submits: u32) -> Self {
        Self {
            hanging_submits,
            ..Self::accepting()
        }
    }

    pub fn verify_count(&self) -> u32 {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn submit_count(&self) -> u32 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn recorded_keys(&self) -> Vec<Uuid> {
        self.keys_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionBackend for MockBackend {
    async fn verify_token(&self, _token: &VerificationToken) -> Result<()> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if self.verify_fail {
            Err(Error::VerificationFailed("token rejected".into()))
        } else {
            Ok(())
        }
    }

    async fn submit(
        &self,
        snapshot: &veriloc_capture::session::SessionSnapshot,
        _identity: &Identity,
        _token: &VerificationToken,
    ) -> Result<SubmissionReceipt> {
        let call = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.keys_seen
            .lock()
            .unwrap()
            .push(snapshot.idempotency_key);

        if call <= self.hanging_submits {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = &self.validation_reject {
            return Err(Error::ValidationRejected(reason.clone()));
        }
        if call <= self.transient_failures {
            return Err(Error::TransientSubmissionFailure(format!(
                "connection reset (call {})",
                call
            )));
        }
        Ok(SubmissionReceipt {
            record_id: "rec-1".into(),
            message: "Location added".into(),
        })
    }
}

/// Geocoding provider with per-query artificial latency and call counters
pub struct DelayedGeocoder {
    pub delays_ms: HashMap<String, u64>,
    pub coordinates: HashMap<String, Coordinate>,
    pub reverse_calls: AtomicU32,
    pub forward_calls: AtomicU32,
    pub places: Vec<PlaceCandidate>,
}

impl DelayedGeocoder {
    pub fn new() -> Self {
        Self {
            delays_ms: HashMap::new(),
            coordinates: HashMap::new(),
            reverse_calls: AtomicU32::new(0),
            forward_calls: AtomicU32::new(0),
            places: vec![PlaceCandidate {
                name: Some("Somewhere".into()),
                ..PlaceCandidate::default()
            }],
        }
    }

    pub fn with_result(mut self, query: &str, coordinate: Coordinate, delay_ms: u64) -> Self {
        self.coordinates.insert(query.to_string(), coordinate);
        self.delays_ms.insert(query.to_string(), delay_ms);
        self
    }

    pub fn reverse_count(&self) -> u32 {
        self.reverse_calls.load(Ordering::SeqCst)
    }

    pub fn forward_count(&self) -> u32 {
        self.forward_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodingProvider for DelayedGeocoder {
    async fn forward_geocode(&self, query: &str) -> Result<Option<Coordinate>> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays_ms.get(query) {
            tokio::time::sleep(Duration::from_millis(*delay)).await;
        }
        Ok(self.coordinates.get(query).copied())
    }

    async fn reverse_geocode(&self, _coordinate: Coordinate) -> Result<Vec<PlaceCandidate>> {
        self.reverse_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.places.clone())
    }
}
