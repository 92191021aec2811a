//! Session presets.

use crate::error::ConfigError;
use crate::models::{JobKind, Limits, RunMode, SessionConfig};
use once_cell::sync::Lazy;
use std::collections::HashMap;

static PRESETS: Lazy<HashMap<&'static str, PresetDefinition>> = Lazy::new(|| {
    let mut presets = HashMap::new();

    presets.insert(
        "quick",
        PresetDefinition {
            name: "quick",
            description: "Quick check (fixed workload, 15s)",
            mode: RunMode::Fixed,
            duration_sec: 15,
            auto_scale: false,
            particle_count: 50_000,
        },
    );

    presets.insert(
        "standard",
        PresetDefinition {
            name: "standard",
            description: "Standard run (fixed workload, 60s)",
            mode: RunMode::Fixed,
            duration_sec: 60,
            auto_scale: false,
            particle_count: 100_000,
        },
    );

    presets.insert(
        "extended",
        PresetDefinition {
            name: "extended",
            description: "Extended soak (fixed workload, 180s)",
            mode: RunMode::Fixed,
            duration_sec: 180,
            auto_scale: false,
            particle_count: 100_000,
        },
    );

    presets.insert(
        "stress-test",
        PresetDefinition {
            name: "stress-test",
            description: "Stress test (auto-scaling workload, 60s)",
            mode: RunMode::Stress,
            duration_sec: 60,
            auto_scale: true,
            particle_count: 200_000,
        },
    );

    presets.insert(
        "custom",
        PresetDefinition {
            name: "custom",
            description: "Custom duration, limits and workload size",
            mode: RunMode::Custom,
            duration_sec: 60,
            auto_scale: false,
            particle_count: 100_000,
        },
    );

    presets
});

/// Named starting point for a `SessionConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub mode: RunMode,
    pub duration_sec: u32,
    pub auto_scale: bool,
    /// Particle count used for Particle jobs
    pub particle_count: u64,
}

/// User values layered over a preset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetOverrides {
    pub duration_sec: Option<u32>,
    pub temp_c: Option<u32>,
    pub mem_pct: Option<u32>,
    pub power_w: Option<u32>,
    pub size_param: Option<u64>,
    pub visualize: bool,
}

/// Get a preset by name.
pub fn get_preset(name: &str) -> Option<&'static PresetDefinition> {
    PRESETS.get(name.to_lowercase().as_str())
}

/// Preset names, shortest run first.
pub fn preset_names() -> Vec<&'static str> {
    let mut presets: Vec<&PresetDefinition> = PRESETS.values().collect();
    presets.sort_by_key(|p| (p.mode == RunMode::Custom, p.duration_sec, p.name));
    presets.into_iter().map(|p| p.name).collect()
}

impl PresetDefinition {
    /// Build the session configuration for `job_kind`.
    pub fn to_config(&self, job_kind: JobKind, overrides: &PresetOverrides) -> SessionConfig {
        let defaults = Limits::default();
        let size_param = overrides.size_param.or(match job_kind {
            JobKind::Particle => Some(self.particle_count),
            JobKind::Gemm => None,
        });

        SessionConfig {
            job_kind,
            mode: self.mode,
            duration_sec: overrides.duration_sec.unwrap_or(self.duration_sec),
            auto_scale: self.auto_scale,
            limits: Limits {
                temp_c: overrides.temp_c.unwrap_or(defaults.temp_c),
                mem_pct: overrides.mem_pct.unwrap_or(defaults.mem_pct),
                power_w: overrides.power_w.unwrap_or(defaults.power_w),
            },
            size_param,
            visualize: overrides.visualize,
        }
    }
}

/// Resolve `preset` and build a validated configuration.
pub fn build_config(
    preset: &str,
    job_kind: JobKind,
    overrides: &PresetOverrides,
) -> Result<SessionConfig, ConfigError> {
    let definition = get_preset(preset).ok_or_else(|| {
        ConfigError::ValidationFailed(format!(
            "Unknown preset '{}', expected one of: {}",
            preset,
            preset_names().join(", ")
        ))
    })?;

    let config = definition.to_config(job_kind, overrides);
    config.validate().map_err(ConfigError::ValidationFailed)?;
    Ok(config)
}
