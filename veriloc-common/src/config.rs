//! Configuration loading and policy constants
//!
//! Resolution priority order:
//! 1. Explicit path argument (highest priority)
//! 2. `VERILOC_CONFIG` environment variable
//! 3. OS config directory (`<config dir>/veriloc/config.toml`)
//! 4. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "VERILOC_CONFIG";

/// Axis-isolation policy for rotation integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisPolicy {
    /// Integrate yaw about the vertical axis only (|z|)
    Vertical,
    /// Integrate the full angular-velocity vector magnitude.
    /// For devices where the vertical axis cannot be isolated.
    Magnitude,
}

/// Geocoding behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Trailing debounce quiet window for search and region-settle, in ms
    pub debounce_ms: u64,
    /// Per-request timeout for the geocoding provider, in ms
    pub request_timeout_ms: u64,
    /// Maximum number of place candidates requested per reverse lookup
    pub max_candidates: usize,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 400,
            request_timeout_ms: 10_000,
            max_candidates: 10,
        }
    }
}

/// Rotation accumulation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Angular velocities below this magnitude (rad/s) are treated as sensor
    /// idle jitter and contribute nothing
    pub noise_floor_rad_s: f64,
    /// Samples separated by more than this many ms are not integrated across
    /// (the sensor stream paused; integrating would create phantom rotation)
    pub gap_ceiling_ms: u64,
    /// Fraction of a full turn required before the session counts as ready
    pub required_fraction: f64,
    /// Which axes count toward rotation coverage
    pub axis_policy: AxisPolicy,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            noise_floor_rad_s: 0.02,
            gap_ceiling_ms: 1_000,
            required_fraction: 1.0,
            axis_policy: AxisPolicy::Vertical,
        }
    }
}

/// Submission retry and timeout policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Maximum automatic retries after a transient failure
    pub max_retries: u32,
    /// First backoff delay, in ms (doubled each retry)
    pub initial_backoff_ms: u64,
    /// Backoff cap, in ms
    pub max_backoff_ms: u64,
    /// Per-round-trip timeout for backend requests, in ms
    pub request_timeout_ms: u64,
    /// Upper bound on challenge-token acquisition, in ms
    pub challenge_timeout_ms: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            request_timeout_ms: 10_000,
            challenge_timeout_ms: 60_000,
        }
    }
}

/// Top-level pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub geo: GeoConfig,
    pub rotation: RotationConfig,
    pub submission: SubmissionConfig,
}

impl CaptureConfig {
    /// Load configuration following the priority order above.
    ///
    /// Missing files fall through to the next priority level; a file that
    /// exists but fails to parse or validate is an error.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        // Priority 1: explicit path must exist
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        // Priority 3: OS config directory
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        // Priority 4: compiled defaults
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded capture configuration");
        Ok(config)
    }

    /// Reject nonsensical policy values
    pub fn validate(&self) -> Result<()> {
        if self.geo.debounce_ms == 0 {
            return Err(Error::Config("geo.debounce_ms must be > 0".into()));
        }
        if self.rotation.gap_ceiling_ms == 0 {
            return Err(Error::Config("rotation.gap_ceiling_ms must be > 0".into()));
        }
        if self.rotation.noise_floor_rad_s < 0.0 {
            return Err(Error::Config(
                "rotation.noise_floor_rad_s must be >= 0".into(),
            ));
        }
        if !(self.rotation.required_fraction > 0.0 && self.rotation.required_fraction <= 1.0) {
            return Err(Error::Config(
                "rotation.required_fraction must be in (0, 1]".into(),
            ));
        }
        if self.submission.initial_backoff_ms == 0
            || self.submission.max_backoff_ms < self.submission.initial_backoff_ms
        {
            return Err(Error::Config(
                "submission backoff bounds are inconsistent".into(),
            ));
        }
        Ok(())
    }
}

/// Platform config file location (`<config dir>/veriloc/config.toml`)
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("veriloc").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        assert!(CaptureConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_partial_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[rotation]\nrequired_fraction = 0.75\naxis_policy = \"magnitude\"\n"
        )
        .unwrap();

        let config = CaptureConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rotation.required_fraction, 0.75);
        assert_eq!(config.rotation.axis_policy, AxisPolicy::Magnitude);
        // Untouched sections keep their defaults
        assert_eq!(config.geo.debounce_ms, 400);
        assert_eq!(config.submission.max_retries, 3);
    }

    #[test]
    fn rejects_invalid_fraction() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rotation]\nrequired_fraction = 0.0\n").unwrap();
        assert!(CaptureConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn rejects_inconsistent_backoff() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[submission]\ninitial_backoff_ms = 2000\nmax_backoff_ms = 100\n"
        )
        .unwrap();
        assert!(CaptureConfig::from_file(file.path()).is_err());
    }

    #[test]
    #[serial]
    fn env_var_points_at_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[geo]\ndebounce_ms = 321\n").unwrap();

        std::env::set_var(CONFIG_ENV_VAR, file.path());
        let config = CaptureConfig::load(None).unwrap();
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(config.geo.debounce_ms, 321);
    }

    #[test]
    #[serial]
    fn falls_back_to_defaults_without_sources() {
        std::env::remove_var(CONFIG_ENV_VAR);
        // No explicit path; env unset. A user config file may exist on the
        // host, so only assert validity here.
        let config = CaptureConfig::load(None).unwrap();
        assert!(config.validate().is_ok());
    }
}
