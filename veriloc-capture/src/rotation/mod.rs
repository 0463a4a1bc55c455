//! Rotation evidence accumulation
//!
//! Converts the noisy angular-velocity stream from the device gyroscope into
//! a bounded, monotone estimate of how much physical rotation the operator
//! has performed since the session started. The estimate is evidentiary, not
//! safety-critical: under-reporting is acceptable, phantom rotation from
//! stationary jitter or sensor-stream gaps is not.

pub mod source;

pub use source::{RotationTracker, SubscriptionHandle};

use serde::{Deserialize, Serialize};
use veriloc_common::config::{AxisPolicy, RotationConfig};

/// One raw gyroscope reading, in radians/second per axis.
///
/// Samples are ephemeral: ingested and discarded immediately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Sample timestamp in milliseconds (sensor clock, monotone in practice)
    pub timestamp_ms: u64,
}

impl RotationSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: u64) -> Self {
        Self {
            x,
            y,
            z,
            timestamp_ms,
        }
    }
}

/// Accumulated rotation since session start.
///
/// `accumulated_degrees` never decreases except through
/// [`RotationAccumulator::reset`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    pub accumulated_degrees: f64,
    pub last_sample_timestamp_ms: Option<u64>,
}

/// Integrates angular-velocity samples into rotation coverage.
#[derive(Debug, Clone)]
pub struct RotationAccumulator {
    state: RotationState,
    config: RotationConfig,
}

impl RotationAccumulator {
    pub fn new(config: RotationConfig) -> Self {
        Self {
            state: RotationState::default(),
            config,
        }
    }

    /// Consume one sample, returning the degrees it contributed.
    ///
    /// Contribution is zero when:
    /// - this is the first sample (it only seeds the timestamp),
    /// - the sample is out of order (timestamp not after the last one),
    /// - the gap since the last sample exceeds the ceiling (the stream
    ///   paused; the timestamp re-seeds but nothing is integrated),
    /// - the angular velocity is below the noise floor (idle jitter).
    pub fn ingest(&mut self, sample: RotationSample) -> f64 {
        let last = match self.state.last_sample_timestamp_ms {
            None => {
                self.state.last_sample_timestamp_ms = Some(sample.timestamp_ms);
                return 0.0;
            }
            Some(last) => last,
        };

        if sample.timestamp_ms <= last {
            tracing::debug!(
                sample_ts = sample.timestamp_ms,
                last_ts = last,
                "Dropping out-of-order rotation sample"
            );
            return 0.0;
        }

        let dt_ms = sample.timestamp_ms - last;
        self.state.last_sample_timestamp_ms = Some(sample.timestamp_ms);

        if dt_ms > self.config.gap_ceiling_ms {
            tracing::debug!(
                dt_ms,
                gap_ceiling_ms = self.config.gap_ceiling_ms,
                "Sensor stream gap exceeds ceiling; not integrating across it"
            );
            return 0.0;
        }

        let rate = match self.config.axis_policy {
            AxisPolicy::Vertical => sample.z.abs(),
            AxisPolicy::Magnitude => {
                (sample.x * sample.x + sample.y * sample.y + sample.z * sample.z).sqrt()
            }
        };

        if rate < self.config.noise_floor_rad_s {
            return 0.0;
        }

        let contribution = (rate * dt_ms as f64 / 1000.0).to_degrees();
        debug_assert!(contribution >= 0.0);
        self.state.accumulated_degrees += contribution;
        contribution
    }

    /// Total physical rotation accumulated so far, in degrees
    pub fn accumulated_degrees(&self) -> f64 {
        self.state.accumulated_degrees
    }

    /// Fraction of a full turn completed, clamped to [0, 1]
    pub fn progress_fraction(&self) -> f64 {
        (self.state.accumulated_degrees / 360.0).min(1.0)
    }

    /// Current state (for events and snapshots)
    pub fn state(&self) -> RotationState {
        self.state
    }

    /// Zero the accumulated rotation; used when the user restarts capture
    pub fn reset(&mut self) {
        self.state = RotationState::default();
    }
}
