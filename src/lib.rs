//! gpumon: GPU benchmark session control
//!
//! Client-side control surface for a remote GPU benchmark engine: starts and
//! follows benchmark/simulation runs, keeps rolling telemetry windows, drives
//! the server's graceful shutdown handshake and provides a windowed view over
//! stored metric history.
//!
//! The system is organized into functional modules:
//! - **error**: Unified error type hierarchy
//! - **models**: Wire types and the immutable `SessionConfig`
//! - **http**: Shared reqwest plumbing
//! - **engine**: Benchmark engine contract and HTTP client
//! - **session**: Session lifecycle controller, sampler buffer, poll loop
//! - **shutdown**: Shutdown coordinator and liveness prober
//! - **history**: Telemetry store client and history window
//! - **config**: Settings persistence, validation and session presets
//! - **cli**: Command-line definitions for the `gpumon` binary

// Core foundational modules
pub mod error;
pub mod models;
pub mod http;

// Remote collaborators and the state machines driving them
pub mod engine;
pub mod session;
pub mod shutdown;
pub mod history;

// Settings, logging, command line
pub mod config;
pub mod log_collector;
pub mod cli;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::{LogCollector, LogLine};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    AppError, ClientError, ConfigError, HistoryError, Result, ShutdownError, StartError, StopError,
};

pub use models::{
    Baseline, EngineStatus, FinalResults, JobKind, JobResult, Limits, RunMode, Sample,
    SessionConfig,
};

pub use engine::{BenchmarkEngine, HttpEngineClient};

pub use session::{
    MetricChannel, SamplerBuffer, SessionController, SessionOptions, SessionPhase, SessionState,
};

pub use shutdown::{
    HostProbe, HttpHostClient, LivenessProber, ProbeOutcome, ShutdownCoordinator, ShutdownOptions,
    ShutdownPhase,
};

pub use history::{HistoryRange, HistorySeries, HistoryWindow, HttpTelemetryStore, TelemetryStore};

pub use config::{Settings, SettingsManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
