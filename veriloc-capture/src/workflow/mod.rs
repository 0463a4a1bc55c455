//! Submission workflow: verify-then-submit state machine
//!
//! State progression:
//! `Draft → Verifying → Submitting → {Succeeded, Failed}`, with
//! `Failed → Verifying` on manual resubmission and `Succeeded` terminal.
//!
//! The submission endpoint is never contacted without a confirmed
//! verification in the same attempt: `Submitting` is only entered from
//! `Verifying` after the challenge token has been verified server-side.
//! Every retry of one session's submission carries the same idempotency
//! key, so the backend can de-duplicate repeated attempts.

pub mod retry;

use crate::backend::{ChallengeProvider, SubmissionBackend};
use crate::session::{SessionSnapshot, SharedSession};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use veriloc_common::config::SubmissionConfig;
use veriloc_common::events::{CaptureEvent, EventBus, SubmissionPhase};
use veriloc_common::{Error, Identity, Result, SubmissionReceipt};

/// Why an attempt settled as `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Challenge not passed, expired, timed out, or token rejected
    Verification,
    /// Server rejected the payload (4xx); terminal for this attempt
    Validation,
    /// Transport/5xx failures exhausted the retry bound
    Transient,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Verification => write!(f, "verification"),
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::Transient => write!(f, "transient"),
        }
    }
}

/// Current state of the submission attempt for one capture session
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    /// No attempt in flight; submission can be requested
    Draft,
    /// Waiting on the challenge provider and server-side token verification
    Verifying,
    /// Verification confirmed; submission request (with retries) in flight
    Submitting,
    /// Backend accepted the submission; terminal
    Succeeded { receipt: SubmissionReceipt },
    /// Attempt settled as failed; manual resubmission is allowed
    Failed { kind: FailureKind, reason: String },
}

impl AttemptState {
    /// Serializable projection for events
    pub fn phase(&self) -> SubmissionPhase {
        match self {
            AttemptState::Draft => SubmissionPhase::Draft,
            AttemptState::Verifying => SubmissionPhase::Verifying,
            AttemptState::Submitting => SubmissionPhase::Submitting,
            AttemptState::Succeeded { .. } => SubmissionPhase::Succeeded,
            AttemptState::Failed { .. } => SubmissionPhase::Failed,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, AttemptState::Verifying | AttemptState::Submitting)
    }
}

struct Attempt {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Drives one capture session's submission.
///
/// Holds the session handle, the two external ports, and the attempt state.
/// At most one attempt is outstanding at any time; an attempt operates only
/// on its immutable snapshot, never on live session state.
pub struct SubmissionWorkflow {
    session: SharedSession,
    identity: Identity,
    context: AttemptContext,
    // Lock order: state before attempt, everywhere
    attempt: Mutex<Option<Attempt>>,
}

/// The clones an attempt task needs
#[derive(Clone)]
struct AttemptContext {
    challenge: Arc<dyn ChallengeProvider>,
    backend: Arc<dyn SubmissionBackend>,
    config: SubmissionConfig,
    bus: EventBus,
    state: Arc<RwLock<AttemptState>>,
}

impl SubmissionWorkflow {
    pub fn new(
        session: SharedSession,
        identity: Identity,
        challenge: Arc<dyn ChallengeProvider>,
        backend: Arc<dyn SubmissionBackend>,
        config: SubmissionConfig,
        bus: EventBus,
    ) -> Self {
        Self {
            session,
            identity,
            context: AttemptContext {
                challenge,
                backend,
                config,
                bus,
                state: Arc::new(RwLock::new(AttemptState::Draft)),
            },
            attempt: Mutex::new(None),
        }
    }

    /// Current attempt state
    pub async fn state(&self) -> AttemptState {
        self.context.state.read().await.clone()
    }

    /// Begin (or re-begin, after `Failed`) the submission.
    ///
    /// - While `Verifying`/`Submitting`: no-op, returns the in-flight state;
    ///   no second challenge is opened.
    /// - Once `Succeeded`: returns the terminal state unchanged.
    /// - Otherwise: performs a fresh readiness check (`NotReady` lists what
    ///   is missing), snapshots the session, and starts the attempt.
    pub async fn request_submission(&self) -> Result<AttemptState> {
        let mut state = self.context.state.write().await;
        match &*state {
            AttemptState::Verifying | AttemptState::Submitting => {
                tracing::debug!(state = %state.phase(), "Submission already in flight; ignoring request");
                return Ok(state.clone());
            }
            AttemptState::Succeeded { .. } => {
                tracing::debug!("Session already submitted; ignoring request");
                return Ok(state.clone());
            }
            AttemptState::Draft | AttemptState::Failed { .. } => {}
        }

        // Readiness can have regressed since the UI enabled the button
        let snapshot = self.session.snapshot().await?;

        let old_phase = state.phase();
        *state = AttemptState::Verifying;
        self.context.bus.emit_lossy(CaptureEvent::SubmissionStateChanged {
            session_id: snapshot.session_id,
            old_phase,
            new_phase: SubmissionPhase::Verifying,
            timestamp: Utc::now(),
        });

        tracing::info!(
            session_id = %snapshot.session_id,
            idempotency_key = %snapshot.idempotency_key,
            "Starting submission attempt"
        );

        let cancel = CancellationToken::new();
        let context = self.context.clone();
        let identity = self.identity.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            context.drive(snapshot, identity, task_cancel).await;
        });

        let mut attempt = self.attempt.lock().await;
        if let Some(stale) = attempt.replace(Attempt { handle, cancel }) {
            // A previous settled attempt's finished task; nothing to cancel
            stale.handle.abort();
        }
        drop(attempt);
        drop(state);

        Ok(AttemptState::Verifying)
    }

    /// Abandon the in-flight attempt (session reset or navigation away).
    ///
    /// The attempt's eventual completion is discarded rather than applied;
    /// no network effect is undone, since the backend de-duplicates on the
    /// idempotency key. The workflow returns to `Draft`.
    pub async fn abandon(&self) {
        let mut state = self.context.state.write().await;
        let mut attempt = self.attempt.lock().await;
        if let Some(attempt) = attempt.take() {
            attempt.cancel.cancel();
        }
        if state.is_in_flight() {
            let session_id = self.session.id().await;
            tracing::info!(session_id = %session_id, "Abandoning in-flight submission attempt");
            let old_phase = state.phase();
            *state = AttemptState::Draft;
            self.context.bus.emit_lossy(CaptureEvent::SubmissionStateChanged {
                session_id,
                old_phase,
                new_phase: SubmissionPhase::Draft,
                timestamp: Utc::now(),
            });
        }
    }

    /// Wait for the current attempt (if any) to settle, then return the state
    pub async fn settled(&self) -> AttemptState {
        let handle = {
            let mut attempt = self.attempt.lock().await;
            attempt.take().map(|a| a.handle)
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.state().await
    }
}

impl AttemptContext {
    /// Run the attempt and apply its outcome, unless abandoned meanwhile
    async fn drive(self, snapshot: SessionSnapshot, identity: Identity, cancel: CancellationToken) {
        let session_id = snapshot.session_id;
        let settled = self.run(&snapshot, &identity, &cancel).await;

        if cancel.is_cancelled() {
            tracing::info!(
                session_id = %session_id,
                outcome = %settled.phase(),
                "Attempt abandoned; discarding outcome"
            );
            return;
        }
        self.apply_state(session_id, settled, &cancel).await;
    }

    /// Verify, then submit. Never contacts the submission endpoint unless
    /// verification confirmed in this same attempt.
    async fn run(
        &self,
        snapshot: &SessionSnapshot,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> AttemptState {
        // Step 1: challenge token from the external provider
        let challenge_timeout = Duration::from_millis(self.config.challenge_timeout_ms);
        let token = match tokio::time::timeout(challenge_timeout, self.challenge.open()).await {
            Err(_) => {
                return AttemptState::Failed {
                    kind: FailureKind::Verification,
                    reason: "challenge timed out".into(),
                }
            }
            Ok(Err(err)) => {
                return AttemptState::Failed {
                    kind: FailureKind::Verification,
                    reason: verification_reason(err),
                }
            }
            Ok(Ok(token)) => token,
        };
        if cancel.is_cancelled() {
            return AttemptState::Draft;
        }

        // Step 2: verify the token server-side before anything else
        let request_timeout = Duration::from_millis(self.config.request_timeout_ms);
        let verified = tokio::time::timeout(request_timeout, self.backend.verify_token(&token)).await;
        match verified {
            Err(_) => {
                return AttemptState::Failed {
                    kind: FailureKind::Verification,
                    reason: "verification timed out".into(),
                }
            }
            Ok(Err(err)) => {
                return AttemptState::Failed {
                    kind: FailureKind::Verification,
                    reason: verification_reason(err),
                }
            }
            Ok(Ok(())) => {}
        }
        if cancel.is_cancelled() {
            return AttemptState::Draft;
        }

        // Verification confirmed: enter Submitting
        self.apply_state(snapshot.session_id, AttemptState::Submitting, cancel)
            .await;

        // Step 3: submit, retrying transient failures with the SAME key
        let result = retry::retry_transient("location submission", &self.config, || {
            let submit = self.backend.submit(snapshot, identity, &token);
            async move {
                match tokio::time::timeout(request_timeout, submit).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::TransientSubmissionFailure(
                        "submission request timed out".into(),
                    )),
                }
            }
        })
        .await;

        match result {
            Ok(receipt) => AttemptState::Succeeded { receipt },
            Err(Error::ValidationRejected(reason)) => AttemptState::Failed {
                kind: FailureKind::Validation,
                reason,
            },
            Err(Error::TransientSubmissionFailure(reason)) => AttemptState::Failed {
                kind: FailureKind::Transient,
                reason,
            },
            Err(other) => AttemptState::Failed {
                kind: FailureKind::Transient,
                reason: other.to_string(),
            },
        }
    }

    /// Apply a state transition and emit its events, unless abandoned
    async fn apply_state(
        &self,
        session_id: Uuid,
        new_state: AttemptState,
        cancel: &CancellationToken,
    ) {
        let mut state = self.state.write().await;
        // Re-checked under the lock: abandon() cancels while holding this
        // lock, so an abandonment that lands while we wait for it must not
        // be overwritten afterwards.
        if cancel.is_cancelled() {
            return;
        }
        let old_phase = state.phase();
        let new_phase = new_state.phase();
        *state = new_state.clone();
        drop(state);

        tracing::info!(
            session_id = %session_id,
            old_state = %old_phase,
            new_state = %new_phase,
            "Submission state changed"
        );
        self.bus.emit_lossy(CaptureEvent::SubmissionStateChanged {
            session_id,
            old_phase,
            new_phase,
            timestamp: Utc::now(),
        });

        match new_state {
            AttemptState::Succeeded { receipt } => {
                self.bus.emit_lossy(CaptureEvent::SubmissionSucceeded {
                    session_id,
                    record_id: receipt.record_id,
                    timestamp: Utc::now(),
                });
            }
            AttemptState::Failed { kind, reason } => {
                tracing::warn!(
                    session_id = %session_id,
                    kind = %kind,
                    reason = %reason,
                    "Submission attempt failed"
                );
                self.bus.emit_lossy(CaptureEvent::SubmissionFailed {
                    session_id,
                    reason,
                    timestamp: Utc::now(),
                });
            }
            _ => {}
        }
    }
}

/// Keep the provider's own wording when it already says why
fn verification_reason(err: Error) -> String {
    match err {
        Error::VerificationFailed(reason) => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_project_from_states() {
        assert_eq!(AttemptState::Draft.phase(), SubmissionPhase::Draft);
        assert_eq!(
            AttemptState::Failed {
                kind: FailureKind::Transient,
                reason: "x".into()
            }
            .phase(),
            SubmissionPhase::Failed
        );
        assert!(AttemptState::Verifying.is_in_flight());
        assert!(AttemptState::Submitting.is_in_flight());
        assert!(!AttemptState::Draft.is_in_flight());
    }

    #[test]
    fn verification_reason_unwraps_provider_wording() {
        assert_eq!(
            verification_reason(Error::VerificationFailed("expired".into())),
            "expired"
        );
        assert_eq!(
            verification_reason(Error::ProviderUnavailable("down".into())),
            "Provider unavailable: down"
        );
    }
}
