//! Command-line interface for the `gpumon` binary.
//!
//! ## Endpoints (global)
//! - `--engine`, `--host`, `--store`: override the URLs from the settings file
//! - `--settings`: alternate settings file
//!
//! ## Commands
//! - `run`: start a session from a preset and follow it to completion
//! - `stop`, `status`, `baseline`: one-shot engine requests
//! - `shutdown`: graceful shutdown handshake with liveness confirmation
//! - `history`: load a metric series and summarize it per day
//! - `config`: print the effective settings, optionally saving them

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{PresetOverrides, Settings};
use crate::history::HistoryRange;
use crate::models::JobKind;

#[derive(Parser, Debug)]
#[command(name = "gpumon")]
#[command(author, version, about = "Control GPU benchmark sessions and the monitor server's shutdown")]
pub struct Cli {
    /// Benchmark engine API root (e.g. http://127.0.0.1:8090/api)
    #[arg(long, global = true, help_heading = "Endpoints")]
    pub engine: Option<String>,

    /// Host API root used for shutdown and liveness probes
    #[arg(long, global = true, help_heading = "Endpoints")]
    pub host: Option<String>,

    /// Telemetry store API root used for history
    #[arg(long, global = true, help_heading = "Endpoints")]
    pub store: Option<String>,

    /// Settings file (default: ~/.config/gpumon/settings.json)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Log debug records to the log file
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a benchmark or simulation and follow it
    Run(RunArgs),

    /// Ask the engine to halt the current run
    Stop,

    /// Print one engine status poll
    Status,

    /// Print the saved baseline for a benchmark type
    Baseline {
        /// gemm or particle
        #[arg(long = "type", default_value = "gemm")]
        job: JobKind,
    },

    /// Shut the monitor server down and confirm it stopped
    Shutdown {
        /// Confirmation budget in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Probe interval in milliseconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Load a metric history and summarize it
    History {
        /// Metric name, e.g. gpu_0_temperature
        #[arg(long)]
        metric: String,

        /// Hours to load, or `lifetime`
        #[arg(long, default_value = "24")]
        hours: HistoryRange,

        /// Zoom factor applied around the center (> 1 zooms in)
        #[arg(long)]
        zoom: Option<f64>,
    },

    /// Print the effective settings
    Config {
        /// Write them to the settings file
        #[arg(long, default_value = "false")]
        save: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// gemm or particle (default from settings)
    #[arg(long = "type", help_heading = "Session")]
    pub job: Option<JobKind>,

    /// quick, standard, extended, stress-test or custom (default from settings)
    #[arg(long, help_heading = "Session")]
    pub preset: Option<String>,

    /// Return right after the engine accepted the job
    #[arg(long, default_value = "false", help_heading = "Session")]
    pub detach: bool,

    /// Run duration in seconds
    #[arg(long, help_heading = "Overrides")]
    pub duration: Option<u32>,

    /// Temperature limit in degrees C
    #[arg(long, help_heading = "Overrides")]
    pub temp_limit: Option<u32>,

    /// Memory limit in percent (0 = none)
    #[arg(long, help_heading = "Overrides")]
    pub memory_limit: Option<u32>,

    /// Power limit in watts (0 = none)
    #[arg(long, help_heading = "Overrides")]
    pub power_limit: Option<u32>,

    /// Matrix size (gemm) or particle count (particle)
    #[arg(long, help_heading = "Overrides")]
    pub size: Option<u64>,

    /// Open the engine's particle visualizer
    #[arg(long, default_value = "false", help_heading = "Overrides")]
    pub visualize: bool,
}

impl RunArgs {
    pub fn overrides(&self) -> PresetOverrides {
        PresetOverrides {
            duration_sec: self.duration,
            temp_c: self.temp_limit,
            mem_pct: self.memory_limit,
            power_w: self.power_limit,
            size_param: self.size,
            visualize: self.visualize,
        }
    }
}

impl Cli {
    /// Layer command-line overrides over loaded settings.
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(url) = &self.engine {
            settings.engine_url = url.clone();
        }
        if let Some(url) = &self.host {
            settings.host_url = url.clone();
        }
        if let Some(url) = &self.store {
            settings.store_url = url.clone();
        }
        if self.debug {
            settings.debug_logging = true;
        }
        if let Command::Shutdown { timeout, interval } = &self.command {
            if let Some(secs) = timeout {
                settings.shutdown_timeout_secs = *secs;
            }
            if let Some(ms) = interval {
                settings.probe_interval_ms = *ms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "gpumon", "run", "--type", "particle", "--preset", "custom", "--duration", "45",
            "--size", "2000000", "--visualize",
        ])
        .unwrap();

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.job, Some(JobKind::Particle));
                assert_eq!(args.preset.as_deref(), Some("custom"));
                let overrides = args.overrides();
                assert_eq!(overrides.duration_sec, Some(45));
                assert_eq!(overrides.size_param, Some(2_000_000));
                assert!(overrides.visualize);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_endpoint_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "gpumon", "shutdown", "--engine", "http://gpu-box:8090/api", "--timeout", "10",
        ])
        .unwrap();
        let mut settings = Settings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings.engine_url, "http://gpu-box:8090/api");
        assert_eq!(settings.shutdown_timeout_secs, 10);
        assert_eq!(settings.probe_interval_ms, 1_000);
    }

    #[test]
    fn test_config_save_keeps_overrides() {
        let cli = Cli::try_parse_from([
            "gpumon", "config", "--save", "--store", "http://store:9100/api", "--settings", "/tmp/gpumon.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Config { save: true }));
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/gpumon.json")));

        let mut settings = Settings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings.store_url, "http://store:9100/api");
    }

    #[test]
    fn test_history_range_parsing() {
        let cli = Cli::try_parse_from(["gpumon", "history", "--metric", "gpu_0_power", "--hours", "lifetime"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::History { hours: HistoryRange::Lifetime, .. }
        ));

        assert!(Cli::try_parse_from(["gpumon", "history", "--metric", "x", "--hours", "soon"]).is_err());
        assert!(Cli::try_parse_from(["gpumon", "baseline", "--type", "fft"]).is_err());
    }
}
