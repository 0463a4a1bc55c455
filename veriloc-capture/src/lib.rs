//! # Veriloc Capture
//!
//! Client-side orchestration for registering a physical location:
//! resolve a place name or map gesture into a coordinate plus address
//! candidates, accumulate rotation evidence from gyroscope samples, and
//! drive the verify-then-submit workflow against the backend.
//!
//! The crate renders nothing and persists nothing; the embedding UI feeds
//! it gestures, sensor samples, and a media reference, and observes
//! progress through the [`veriloc_common::events::EventBus`].

pub mod backend;
pub mod geo;
pub mod rotation;
pub mod session;
pub mod workflow;

pub use backend::{ChallengeProvider, HttpBackend, SubmissionBackend, VerificationToken};
pub use geo::{GeoResolver, GeoUpdate, GeocodingProvider};
pub use rotation::{RotationAccumulator, RotationSample, RotationState};
pub use session::{CaptureSession, SessionSnapshot, SessionStatus, SharedSession};
pub use workflow::{AttemptState, SubmissionWorkflow};
