//! Settings validation.

use super::Settings;
use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;

static HTTP_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.\-\[\]:]+(:\d{1,5})?(/[A-Za-z0-9._~\-/]*)?$").unwrap()
});

/// Validate an endpoint URL (http or https, no query string).
pub fn validate_url(name: &str, url: &str) -> Result<(), ConfigError> {
    if url.is_empty() {
        return Err(ConfigError::ValidationFailed(format!("{} cannot be empty", name)));
    }
    if !HTTP_URL.is_match(url) {
        return Err(ConfigError::ValidationFailed(format!(
            "{} must be an http(s) URL without query string, got: {}",
            name, url
        )));
    }
    Ok(())
}

/// Check that `value` lies in `min..=max`.
fn validate_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::ValidationFailed(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Validate every field of `Settings`.
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    validate_url("engine_url", &settings.engine_url)?;
    validate_url("host_url", &settings.host_url)?;
    validate_url("store_url", &settings.store_url)?;

    validate_range("request_timeout_ms", settings.request_timeout_ms, 100, 600_000)?;
    validate_range("poll_interval_ms", settings.poll_interval_ms, 50, 60_000)?;
    validate_range("buffer_capacity", settings.buffer_capacity as u64, 1, 100_000)?;
    validate_range("shutdown_timeout_secs", settings.shutdown_timeout_secs, 1, 3_600)?;
    validate_range("probe_interval_ms", settings.probe_interval_ms, 50, 60_000)?;
    validate_range(
        "probe_consecutive_failures",
        settings.probe_consecutive_failures as u64,
        1,
        100,
    )?;

    if super::presets::get_preset(&settings.default_preset).is_none() {
        return Err(ConfigError::ValidationFailed(format!(
            "Unknown default_preset '{}', expected one of: {}",
            settings.default_preset,
            super::presets::preset_names().join(", ")
        )));
    }
    if settings.default_job.parse::<crate::models::JobKind>().is_err() {
        return Err(ConfigError::ValidationFailed(format!(
            "Unknown default_job '{}', expected gemm or particle",
            settings.default_job
        )));
    }
    if settings.log_dir.trim().is_empty() {
        return Err(ConfigError::ValidationFailed(
            "log_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}
