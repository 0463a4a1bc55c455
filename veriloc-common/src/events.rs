//! Event types and EventBus for the capture pipeline
//!
//! Components emit [`CaptureEvent`]s on an [`EventBus`] so the embedding UI
//! can observe progress without polling. Events are broadcast lossily: a UI
//! that is not listening does not stall the pipeline.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Coarse phase of a submission attempt, mirrored into events.
///
/// The workflow's full state (with receipt/reason payloads) lives in the
/// capture crate; events carry this serializable projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionPhase {
    Draft,
    Verifying,
    Submitting,
    Succeeded,
    Failed,
}

impl std::fmt::Display for SubmissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionPhase::Draft => write!(f, "draft"),
            SubmissionPhase::Verifying => write!(f, "verifying"),
            SubmissionPhase::Submitting => write!(f, "submitting"),
            SubmissionPhase::Succeeded => write!(f, "succeeded"),
            SubmissionPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Capture pipeline event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CaptureEvent {
    /// Session coordinate changed (search result, map settle, or manual entry)
    CoordinateChanged {
        session_id: Uuid,
        latitude: f64,
        longitude: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// User selected an address for the session
    AddressSelected {
        session_id: Uuid,
        address: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Rotation coverage advanced
    RotationProgress {
        session_id: Uuid,
        accumulated_degrees: f64,
        /// min(1, accumulated / 360)
        fraction: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Media evidence attached to the session
    MediaAttached {
        session_id: Uuid,
        uri: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Media evidence removed from the session
    MediaCleared {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Derived readiness flipped
    ReadinessChanged {
        session_id: Uuid,
        ready: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Submission attempt moved to a new phase
    SubmissionStateChanged {
        session_id: Uuid,
        old_phase: SubmissionPhase,
        new_phase: SubmissionPhase,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Backend accepted the submission
    SubmissionSucceeded {
        session_id: Uuid,
        record_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The attempt settled as failed
    SubmissionFailed {
        session_id: Uuid,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast bus for capture events.
///
/// Thin wrapper over `tokio::sync::broadcast`: multi-producer, multi-consumer,
/// bounded, with old events dropped for slow consumers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CaptureEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; `Ok(subscriber_count)` or `Err` when nobody listens
    pub fn emit(
        &self,
        event: CaptureEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<CaptureEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: CaptureEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit_lossy(CaptureEvent::ReadinessChanged {
            session_id: Uuid::new_v4(),
            ready: true,
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            CaptureEvent::ReadinessChanged { ready, .. } => assert!(ready),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_is_lossy() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        // Must not panic or error through the lossy path
        bus.emit_lossy(CaptureEvent::MediaCleared {
            session_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        });
        assert!(bus
            .emit(CaptureEvent::MediaCleared {
                session_id: Uuid::new_v4(),
                timestamp: chrono::Utc::now(),
            })
            .is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = CaptureEvent::SubmissionStateChanged {
            session_id: Uuid::new_v4(),
            old_phase: SubmissionPhase::Draft,
            new_phase: SubmissionPhase::Verifying,
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SubmissionStateChanged");
        assert_eq!(json["new_phase"], "verifying");
    }
}
