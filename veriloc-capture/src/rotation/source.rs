//! Cancelable pump from a motion-sensor stream into a session
//!
//! The platform sensor layer pushes [`RotationSample`]s into an mpsc channel
//! at whatever cadence it likes; [`RotationTracker::attach`] forwards them
//! into the shared session until the subscription is canceled or the sender
//! side is dropped. Tests drive the same interface with synthetic,
//! deterministic sequences.

use crate::rotation::RotationSample;
use crate::session::SharedSession;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a live sensor subscription
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Stop forwarding samples; already-ingested rotation is kept
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the pump task to exit (after cancel or sender drop)
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}

/// Forwards sensor samples into a session's rotation accumulator
pub struct RotationTracker;

impl RotationTracker {
    /// Spawn the forwarding task and return its subscription handle.
    ///
    /// The task exits when the handle is canceled or the sample sender is
    /// dropped. Samples are ingested strictly in arrival order.
    pub fn attach(
        session: SharedSession,
        mut samples: mpsc::Receiver<RotationSample>,
    ) -> SubscriptionHandle {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        tracing::debug!("Rotation subscription canceled");
                        break;
                    }
                    sample = samples.recv() => {
                        match sample {
                            Some(sample) => {
                                session.ingest_rotation(sample).await;
                            }
                            None => {
                                tracing::debug!("Rotation sample stream ended");
                                break;
                            }
                        }
                    }
                }
            }
        });

        SubscriptionHandle { cancel, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;
    use veriloc_common::config::CaptureConfig;
    use veriloc_common::events::EventBus;

    fn session() -> SharedSession {
        SharedSession::new(&CaptureConfig::default(), EventBus::new(16))
    }

    #[tokio::test]
    async fn pump_forwards_samples_in_order() {
        let session = session();
        let (tx, rx) = mpsc::channel(64);
        let handle = RotationTracker::attach(session.clone(), rx);

        for i in 0..=10 {
            tx.send(RotationSample::new(0.0, 0.0, FRAC_PI_2, i * 100))
                .await
                .unwrap();
        }
        drop(tx);
        handle.stopped().await;

        // 1 second at 90 deg/s
        let fraction = session.progress_fraction().await;
        assert!((fraction - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cancel_stops_ingestion() {
        let session = session();
        let (tx, rx) = mpsc::channel(64);
        let handle = RotationTracker::attach(session.clone(), rx);

        tx.send(RotationSample::new(0.0, 0.0, 1.0, 0)).await.unwrap();
        tx.send(RotationSample::new(0.0, 0.0, 1.0, 100)).await.unwrap();

        handle.cancel();
        handle.stopped().await;
        let before = session.progress_fraction().await;

        // Samples sent after cancellation are never ingested
        let _ = tx.send(RotationSample::new(0.0, 0.0, 5.0, 200)).await;
        tokio::task::yield_now().await;
        assert_eq!(session.progress_fraction().await, before);
    }
}
