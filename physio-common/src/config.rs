//! Configuration loading and resolution
//!
//! Settings come from four places, in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (merged with 1 by the binary's argument parser)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: the caller gets `TomlConfig::default()`
//! and a warning in the log. A TOML file that exists but does not parse is a
//! configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application directory name under the platform config dir
pub const APP_DIR_NAME: &str = "physio-coach";

/// Config file name inside [`APP_DIR_NAME`]
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Compiled defaults
pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_JPEG_QUALITY: u8 = 50;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_NARRATION_MIN_INTERVAL_MS: u64 = 5000;

/// TOML configuration file contents
///
/// Every key is optional; unset keys fall through to the compiled defaults.
///
/// ```toml
/// api_url = "http://192.168.1.20:5000"
/// patient_id = 1
///
/// [logging]
/// level = "debug"
///
/// [capture]
/// interval_ms = 2000
/// jpeg_quality = 50
/// request_timeout_ms = 10000
///
/// [narration]
/// enabled = true
/// min_interval_ms = 5000
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct TomlConfig {
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub patient_id: Option<u32>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub narration: NarrationConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or full EnvFilter directive ("info", "physio_coach=debug", ...)
    #[serde(default)]
    pub level: Option<String>,
}

/// `[capture]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct CaptureConfig {
    #[serde(default)]
    pub interval_ms: Option<u64>,

    /// JPEG quality, 1-100
    #[serde(default)]
    pub jpeg_quality: Option<u8>,

    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

/// `[narration]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct NarrationConfig {
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub min_interval_ms: Option<u64>,
}

impl TomlConfig {
    /// Parse TOML text and validate value ranges
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that can never work at runtime
    pub fn validate(&self) -> Result<()> {
        if let Some(quality) = self.capture.jpeg_quality {
            if quality == 0 || quality > 100 {
                return Err(Error::Config(format!(
                    "capture.jpeg_quality must be between 1 and 100, got {}",
                    quality
                )));
            }
        }
        if self.capture.interval_ms == Some(0) {
            return Err(Error::Config(
                "capture.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.capture.request_timeout_ms == Some(0) {
            return Err(Error::Config(
                "capture.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(url) = &self.api_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "api_url must start with http:// or https://, got '{}'",
                    url
                )));
            }
        }
        Ok(())
    }
}

/// Default config file location for the platform
///
/// `~/.config/physio-coach/config.toml` on Linux, the equivalent
/// application-support / AppData folder elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load the TOML config, degrading to defaults when the file is absent
///
/// # Arguments
/// * `explicit` - Path given on the command line; when set, it is the only
///   location consulted.
///
/// # Errors
/// Returns `Error::Config` when a file exists but cannot be read or parsed.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => {
                warn!("Could not determine config directory, using defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    if !path.exists() {
        warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Resolve the backend base URL (CLI/ENV → TOML → default)
///
/// Trailing slashes are stripped so callers can append `/pose` etc.
pub fn resolve_api_url(cli_or_env: Option<&str>, toml_config: &TomlConfig) -> String {
    let url = cli_or_env
        .map(str::to_string)
        .or_else(|| toml_config.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    url.trim_end_matches('/').to_string()
}

/// Resolve one optional setting (CLI/ENV → TOML → default)
pub fn resolve<T>(cli_or_env: Option<T>, toml_value: Option<T>, default: T) -> T {
    cli_or_env.or(toml_value).unwrap_or(default)
}

/// Standard User-Agent for outgoing HTTP requests
pub fn get_user_agent() -> String {
    format!("PhysioCoach/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_priority() {
        assert_eq!(resolve(Some(1), Some(2), 3), 1);
        assert_eq!(resolve(None, Some(2), 3), 2);
        assert_eq!(resolve(None::<u32>, None, 3), 3);
    }

    #[test]
    fn test_resolve_api_url_strips_trailing_slash() {
        let toml_config = TomlConfig {
            api_url: Some("http://10.0.0.5:5000/".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_api_url(None, &toml_config), "http://10.0.0.5:5000");
        assert_eq!(
            resolve_api_url(Some("http://cli:1/"), &toml_config),
            "http://cli:1"
        );
        assert_eq!(
            resolve_api_url(None, &TomlConfig::default()),
            DEFAULT_API_URL
        );
    }

    #[test]
    fn test_user_agent_format() {
        assert!(get_user_agent().starts_with("PhysioCoach/"));
    }
}
