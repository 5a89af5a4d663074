//! physio-coach runtime configuration
//!
//! Merges command-line/environment overrides with the TOML file and the
//! compiled defaults from `physio_common::config`.

use crate::error::{Error, Result};
use physio_common::config::{
    resolve, resolve_api_url, TomlConfig, DEFAULT_CAPTURE_INTERVAL_MS, DEFAULT_JPEG_QUALITY,
    DEFAULT_LOG_LEVEL, DEFAULT_NARRATION_MIN_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS,
};
use std::time::Duration;

/// Capture loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Tick period
    pub interval: Duration,
    /// JPEG quality, 1-100 (50 = quality factor 0.5)
    pub jpeg_quality: u8,
    /// Upper bound on one frame submission
    pub request_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_CAPTURE_INTERVAL_MS),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// Narrator channel settings
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationSettings {
    pub enabled: bool,
    /// Throttle window between two playback starts
    pub min_interval: Duration,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval: Duration::from_millis(DEFAULT_NARRATION_MIN_INTERVAL_MS),
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub patient_id: Option<u32>,
    pub interval_ms: Option<u64>,
    pub no_audio: bool,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct CoachConfig {
    pub api_url: String,
    pub patient_id: u32,
    pub log_level: String,
    pub capture: CaptureSettings,
    pub narration: NarrationSettings,
}

impl CoachConfig {
    /// Resolve every setting (CLI/ENV → TOML → default)
    ///
    /// # Errors
    /// `Error::Config` when no patient id is available from any source or an
    /// override is out of range.
    pub fn resolve(overrides: &ConfigOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let patient_id = overrides
            .patient_id
            .or(toml_config.patient_id)
            .ok_or_else(|| {
                Error::Config(
                    "Patient id not configured. Use --patient-id, PHYSIO_PATIENT_ID \
                     or patient_id in the config file"
                        .to_string(),
                )
            })?;

        let interval_ms = resolve(
            overrides.interval_ms,
            toml_config.capture.interval_ms,
            DEFAULT_CAPTURE_INTERVAL_MS,
        );
        if interval_ms == 0 {
            return Err(Error::Config(
                "Capture interval must be greater than zero".to_string(),
            ));
        }

        let capture = CaptureSettings {
            interval: Duration::from_millis(interval_ms),
            jpeg_quality: toml_config
                .capture
                .jpeg_quality
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            request_timeout: Duration::from_millis(
                toml_config
                    .capture
                    .request_timeout_ms
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            ),
        };

        let narration = NarrationSettings {
            enabled: !overrides.no_audio && toml_config.narration.enabled.unwrap_or(true),
            min_interval: Duration::from_millis(
                toml_config
                    .narration
                    .min_interval_ms
                    .unwrap_or(DEFAULT_NARRATION_MIN_INTERVAL_MS),
            ),
        };

        Ok(Self {
            api_url: resolve_api_url(overrides.api_url.as_deref(), toml_config),
            patient_id,
            log_level: toml_config
                .logging
                .level
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            capture,
            narration,
        })
    }
}
