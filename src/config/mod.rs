//! Configuration module for gpumon.
//!
//! # Module Structure
//!
//! - `loader`: settings file location and JSON (de)serialization
//! - `validator`: range and URL checks for loaded settings
//! - `presets`: named session presets (quick, standard, extended, ...)
//!
//! # Settings Management
//!
//! `Settings` is persisted as JSON at `~/.config/gpumon/settings.json`. Every
//! field has a default, so partial files load fine; CLI flags override the
//! loaded values.

pub mod loader;
pub mod presets;
pub mod validator;

use crate::error::ConfigError;
use crate::session::SessionOptions;
use crate::shutdown::ShutdownOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use presets::{get_preset, preset_names, PresetDefinition, PresetOverrides};

/// Default API root shared by engine, host and store endpoints.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8090/api";

/// Persistent client settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    // Endpoints
    pub engine_url: String,
    pub host_url: String,
    pub store_url: String,
    pub request_timeout_ms: u64,

    // Session
    pub poll_interval_ms: u64,
    pub buffer_capacity: usize,
    pub default_preset: String,
    pub default_job: String,

    // Shutdown handshake
    pub shutdown_timeout_secs: u64,
    pub probe_interval_ms: u64,
    pub probe_consecutive_failures: u32,

    // Logging
    pub log_dir: String,
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            engine_url: DEFAULT_API_URL.to_string(),
            host_url: DEFAULT_API_URL.to_string(),
            store_url: DEFAULT_API_URL.to_string(),
            request_timeout_ms: 10_000,
            poll_interval_ms: 500,
            buffer_capacity: crate::session::DEFAULT_CAPACITY,
            default_preset: "quick".to_string(),
            default_job: "gemm".to_string(),
            shutdown_timeout_secs: 60,
            probe_interval_ms: 1_000,
            probe_consecutive_failures: 1,
            log_dir: "logs".to_string(),
            debug_logging: false,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            buffer_capacity: self.buffer_capacity,
        }
    }

    pub fn shutdown_options(&self) -> ShutdownOptions {
        ShutdownOptions {
            timeout_budget: Duration::from_secs(self.shutdown_timeout_secs),
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            consecutive_failures: self.probe_consecutive_failures,
        }
    }

    /// One-line summary for the startup log.
    pub fn summary(&self) -> String {
        format!(
            "engine={} host={} store={} poll={}ms buffer={} shutdown={}s/{}ms",
            self.engine_url,
            self.host_url,
            self.store_url,
            self.poll_interval_ms,
            self.buffer_capacity,
            self.shutdown_timeout_secs,
            self.probe_interval_ms
        )
    }
}

/// Loads and persists `Settings`.
pub struct SettingsManager;

impl SettingsManager {
    /// Load settings from `path`.
    ///
    /// A missing file yields defaults. A file that no longer parses is logged
    /// and replaced by defaults; a file that parses but fails validation is
    /// an error.
    pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
        let (settings, notice) = Self::load_from_reporting(path)?;
        if let Some(notice) = notice {
            log::warn!("[Config] {}", notice);
        }
        Ok(settings)
    }

    /// Like `load_from`, but hands the fallback notice back to the caller
    /// instead of logging it. Used before a logger is installed.
    pub fn load_from_reporting(path: &Path) -> Result<(Settings, Option<String>), ConfigError> {
        let (settings, notice) = match loader::load_settings_from_file(path) {
            Ok(settings) => (settings, None),
            Err(ConfigError::FileNotFound(_)) => {
                log::debug!("[Config] No settings at {}, using defaults", path.display());
                (Settings::default(), None)
            }
            Err(ConfigError::InvalidJson(e)) => (
                Settings::default(),
                Some(format!(
                    "Failed to parse {}, falling back to defaults: {}",
                    path.display(),
                    e
                )),
            ),
            Err(e) => return Err(e),
        };

        validator::validate_settings(&settings)?;
        Ok((settings, notice))
    }

    /// Save settings to the global path.
    pub fn save(settings: &Settings) -> Result<PathBuf, ConfigError> {
        let path = loader::get_global_settings_path()?;
        Self::save_to(settings, &path)?;
        Ok(path)
    }

    pub fn save_to(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
        validator::validate_settings(settings)?;
        loader::save_settings_to_file(settings, path)
    }
}
