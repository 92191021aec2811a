//! Core data types for gpumon.
//!
//! Wire shapes exchanged with the benchmark engine plus the immutable
//! `SessionConfig` built once per run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Workload executed by the benchmark engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Dense matrix multiplication, measured in TFLOPS
    Gemm,
    /// Particle physics simulation, measured in steps per second
    Particle,
}

impl JobKind {
    /// Value of the engine's `benchmark_type` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Gemm => "gemm",
            JobKind::Particle => "particle",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Gemm => write!(f, "GEMM"),
            JobKind::Particle => write!(f, "Particle"),
        }
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemm" => Ok(JobKind::Gemm),
            "particle" => Ok(JobKind::Particle),
            _ => Err(format!("Unknown job kind: {}", s)),
        }
    }
}

/// How the engine sizes the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Predefined workload size
    Fixed,
    /// Auto-scaling workload that pushes the GPU towards full utilization
    Stress,
    /// User supplied duration, limits and workload size
    Custom,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Fixed => "fixed",
            RunMode::Stress => "stress",
            RunMode::Custom => "custom",
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(RunMode::Fixed),
            "stress" => Ok(RunMode::Stress),
            "custom" => Ok(RunMode::Custom),
            _ => Err(format!("Unknown run mode: {}", s)),
        }
    }
}

/// Safety limits the engine enforces during a run (0 = no limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub temp_c: u32,
    pub mem_pct: u32,
    pub power_w: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            temp_c: 85,
            mem_pct: 0,
            power_w: 0,
        }
    }
}

/// Immutable description of one benchmark/simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub job_kind: JobKind,
    pub mode: RunMode,
    pub duration_sec: u32,
    pub auto_scale: bool,
    pub limits: Limits,
    /// Matrix size for GEMM, particle count for Particle. `None` lets the engine pick.
    pub size_param: Option<u64>,
    /// Ask the engine to open its particle visualizer
    pub visualize: bool,
}

impl SessionConfig {
    /// Fixed-size run with default limits.
    pub fn fixed(job_kind: JobKind, duration_sec: u32) -> Self {
        SessionConfig {
            job_kind,
            mode: RunMode::Fixed,
            duration_sec,
            auto_scale: false,
            limits: Limits::default(),
            size_param: None,
            visualize: false,
        }
    }

    /// Check the invariants the engine cannot be trusted to reject.
    pub fn validate(&self) -> Result<(), String> {
        if self.duration_sec == 0 {
            return Err("duration must be at least one second".to_string());
        }
        if self.limits.mem_pct > 100 {
            return Err(format!(
                "memory limit must be a percentage (0-100), got {}",
                self.limits.mem_pct
            ));
        }
        if let Some(0) = self.size_param {
            return Err("workload size must be positive".to_string());
        }
        if self.mode == RunMode::Stress && !self.auto_scale {
            return Err("stress mode requires auto-scaling".to_string());
        }
        Ok(())
    }

    /// Query parameters for `POST /benchmark/start`.
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("benchmark_type", self.job_kind.as_str().to_string()),
            ("mode", self.mode.as_str().to_string()),
            ("duration", self.duration_sec.to_string()),
            ("auto_scale", self.auto_scale.to_string()),
            ("temp_limit", self.limits.temp_c.to_string()),
            ("memory_limit", self.limits.mem_pct.to_string()),
            ("power_limit", self.limits.power_w.to_string()),
        ];
        if let Some(size) = self.size_param {
            let key = match self.job_kind {
                JobKind::Gemm => "matrix_size",
                JobKind::Particle => "num_particles",
            };
            query.push((key, size.to_string()));
        }
        if self.visualize {
            query.push(("visualize", "true".to_string()));
        }
        query
    }
}

/// One telemetry sample emitted by the engine.
///
/// The engine omits fields on error samples, so every numeric field defaults to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    #[serde(default)]
    pub elapsed_sec: f64,
    #[serde(default, rename = "utilization")]
    pub utilization_pct: f64,
    #[serde(default)]
    pub temperature_c: f64,
    #[serde(default)]
    pub memory_used_mb: f64,
    #[serde(default)]
    pub power_w: f64,
}

/// Body of `GET /benchmark/samples`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamplesResponse {
    #[serde(default)]
    pub samples: Vec<Sample>,
}

/// Body of `GET /benchmark/status`.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub iterations: u64,
    #[serde(default)]
    pub workload_type: Option<String>,
    /// Free-form engine phase text ("Auto-Scaling: ...")
    #[serde(default)]
    pub phase: Option<String>,
}

/// Body of `POST /benchmark/start`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartAck {
    #[serde(default)]
    pub status: String,
}

impl StartAck {
    /// The engine already had a job running and kept it.
    pub fn already_running(&self) -> bool {
        self.status == "already_running"
    }
}

/// GEMM throughput summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GemmResult {
    pub avg_tflops: f64,
    pub peak_tflops: f64,
}

/// Particle simulation throughput summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleResult {
    pub steps_per_sec: f64,
    pub particles_per_sec: f64,
}

/// Per-kind performance summary decoded from the results payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JobResult {
    Gemm(GemmResult),
    Particle(ParticleResult),
}

impl JobResult {
    /// Decode the summary for `kind`. `None` when the engine ran without a
    /// GPU backend and reported no throughput figures.
    pub fn decode(kind: JobKind, payload: &Value) -> Option<Self> {
        let perf = payload.get("performance");
        let number = |v: Option<&Value>| v.and_then(Value::as_f64);

        match kind {
            JobKind::Gemm => {
                let avg = number(payload.get("avg_tflops"))
                    .or_else(|| number(perf.and_then(|p| p.get("tflops"))))?;
                let peak = number(payload.get("peak_tflops"))
                    .or_else(|| number(perf.and_then(|p| p.get("peak_tflops"))))
                    .unwrap_or(avg);
                Some(JobResult::Gemm(GemmResult {
                    avg_tflops: avg,
                    peak_tflops: peak,
                }))
            }
            JobKind::Particle => {
                let perf = perf?;
                let steps = number(perf.get("steps_per_second"))?;
                let particles = number(perf.get("particles_updated_per_second"))?;
                Some(JobResult::Particle(ParticleResult {
                    steps_per_sec: steps,
                    particles_per_sec: particles,
                }))
            }
        }
    }
}

/// Final results of a run: the opaque engine payload plus the decoded summary.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResults {
    pub job_kind: JobKind,
    pub summary: Option<JobResult>,
    pub iterations_completed: Option<u64>,
    pub duration_actual_sec: Option<f64>,
    pub stop_reason: Option<String>,
    pub completed_full: Option<bool>,
    pub payload: Value,
}

impl FinalResults {
    /// Decode a `GET /benchmark/results` payload.
    ///
    /// `fallback_kind` is used when the payload does not name its benchmark type.
    pub fn decode(fallback_kind: JobKind, payload: Value) -> Result<Self, String> {
        match payload.get("status").and_then(Value::as_str) {
            Some("no_results") => return Err("engine has no results for this run".to_string()),
            Some("failed") => {
                let reason = payload
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(format!("run failed on the engine: {}", reason));
            }
            _ => {}
        }

        let job_kind = payload
            .get("benchmark_type")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(fallback_kind);

        Ok(FinalResults {
            job_kind,
            summary: JobResult::decode(job_kind, &payload),
            iterations_completed: payload
                .get("iterations_completed")
                .or_else(|| payload.get("total_iterations"))
                .and_then(Value::as_u64),
            duration_actual_sec: payload.get("duration_actual_sec").and_then(Value::as_f64),
            stop_reason: payload
                .get("stop_reason")
                .and_then(Value::as_str)
                .map(str::to_string),
            completed_full: payload.get("completed_full").and_then(Value::as_bool),
            payload,
        })
    }
}

/// Previously saved baseline for a GPU and benchmark type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub gpu_name: String,
    pub benchmark_type: String,
    #[serde(default)]
    pub run_mode: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub iterations_completed: u64,
    #[serde(default)]
    pub avg_iteration_time_ms: f64,
    #[serde(default)]
    pub avg_utilization: Option<f64>,
    #[serde(default)]
    pub avg_temperature: f64,
    #[serde(default)]
    pub avg_power: Option<f64>,
}

impl Baseline {
    /// Decode a `GET /benchmark/baseline` body; `{status: "no_baseline"}` is `None`.
    pub fn decode(body: Value) -> Result<Option<Self>, String> {
        if body.get("status").and_then(Value::as_str) == Some("no_baseline") || body.is_null() {
            return Ok(None);
        }
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| format!("Invalid baseline payload: {}", e))
    }
}

/// One point as returned by `GET /history`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryPoint {
    pub timestamp: String,
    pub value: f64,
}

/// Body of `GET /history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub data: Vec<HistoryPoint>,
}
