//! Session Lifecycle Controller
//!
//! Drives one benchmark/simulation run end to end: starts the job on the
//! benchmark engine, polls it at a fixed cadence, ingests telemetry into the
//! `SamplerBuffer`, detects terminal completion and fetches final results.
//!
//! **Architecture**:
//! - `SessionPhase`: discrete lifecycle phases with an explicit transition table
//! - `SessionState`: snapshot handed to callers by `status()`
//! - `SessionController`: cheap-to-clone handle; all mutable state sits behind
//!   one coarse mutex that is never held across an `.await`
//!
//! The engine's `running=false` is the single source of truth for terminal
//! detection: `stop()` only asks the engine to halt, the poll loop observes
//! the result. Every response is checked against the run generation and the
//! current phase before it is applied, so late responses to a superseded run
//! are discarded without cancelling the request itself.

pub mod buffer;
pub mod poller;

pub use buffer::{ChannelPoint, MetricChannel, SamplerBuffer, DEFAULT_CAPACITY};
pub use poller::{PeriodicTask, TickControl};

use crate::engine::BenchmarkEngine;
use crate::error::{StartError, StopError};
use crate::models::{Baseline, FinalResults, JobKind, SessionConfig};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No run has been started (or the controller was reset)
    Idle,
    /// Start request in flight
    Starting,
    /// Engine accepted the job, poll loop armed
    Running,
    /// Halt requested, waiting for the engine to report `running=false`
    Stopping,
    /// Engine reported `running=false`; the results fetch was issued
    Completed,
    /// Engine finished but the results fetch failed
    Failed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Starting => "starting",
            SessionPhase::Running => "running",
            SessionPhase::Stopping => "stopping",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }

    /// Phases from which a new run may be started.
    pub fn is_at_rest(&self) -> bool {
        matches!(
            self,
            SessionPhase::Idle | SessionPhase::Completed | SessionPhase::Failed
        )
    }

    /// Phases in which poll ticks are applied.
    pub fn is_polling(&self) -> bool {
        matches!(self, SessionPhase::Running | SessionPhase::Stopping)
    }

    /// Get all valid phase transitions FROM this phase.
    pub fn valid_next_phases(&self) -> Vec<SessionPhase> {
        match self {
            SessionPhase::Idle => vec![SessionPhase::Starting],
            SessionPhase::Starting => vec![
                SessionPhase::Running,
                SessionPhase::Stopping,
                SessionPhase::Idle,
            ],
            SessionPhase::Running => vec![SessionPhase::Stopping, SessionPhase::Completed],
            SessionPhase::Stopping => vec![SessionPhase::Completed, SessionPhase::Idle],
            SessionPhase::Completed => vec![
                SessionPhase::Failed,
                SessionPhase::Starting,
                SessionPhase::Idle,
            ],
            SessionPhase::Failed => vec![SessionPhase::Starting, SessionPhase::Idle],
        }
    }

    /// Check if a transition to the given phase is valid.
    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        self.valid_next_phases().contains(&next)
    }
}

/// Snapshot of a session as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub progress_pct: f64,
    pub iteration_count: u64,
    pub workload_label: Option<String>,
    pub last_error: Option<String>,
    /// Completed, but the results request has not returned yet
    pub results_pending: bool,
}

impl SessionState {
    fn new() -> Self {
        SessionState {
            phase: SessionPhase::Idle,
            progress_pct: 0.0,
            iteration_count: 0,
            workload_label: None,
            last_error: None,
            results_pending: false,
        }
    }

    /// At rest with nothing left in flight for this run.
    pub fn is_settled(&self) -> bool {
        self.phase.is_at_rest() && !self.results_pending
    }

    /// Progress is only meaningful while the engine is running the job.
    pub fn progress(&self) -> Option<f64> {
        match self.phase {
            SessionPhase::Running => Some(self.progress_pct),
            _ => None,
        }
    }

    /// Attempt to transition to the next phase.
    pub fn transition_to(&mut self, next: SessionPhase) -> Result<(), String> {
        if !self.phase.can_transition_to(next) {
            return Err(format!(
                "Invalid session transition: {} -> {}",
                self.phase.as_str(),
                next.as_str()
            ));
        }
        self.phase = next;
        Ok(())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunables for a controller instance.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Fixed poll cadence (no backoff)
    pub poll_interval: Duration,
    /// Window length of every sampler channel
    pub buffer_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            poll_interval: Duration::from_millis(500),
            buffer_capacity: DEFAULT_CAPACITY,
        }
    }
}

struct Inner {
    state: SessionState,
    config: Option<SessionConfig>,
    buffer: SamplerBuffer,
    results: Option<FinalResults>,
    /// Generation of the current run; bumped on every accepted start
    run_id: u64,
    /// How many engine samples of this run were already ingested
    samples_seen: usize,
    /// Run whose tick is currently in flight
    tick_in_flight: Option<u64>,
    poller: Option<PeriodicTask>,
    /// Set by the shutdown coordinator: the server is going away
    disarmed: bool,
}

impl Inner {
    fn apply_transition(&mut self, next: SessionPhase) {
        if let Err(e) = self.state.transition_to(next) {
            log::warn!("[Session] {}", e);
        }
    }

    fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.cancel();
        }
    }

    /// True when a response for `run_id` may still change state.
    fn accepts(&self, run_id: u64) -> bool {
        self.run_id == run_id && !self.disarmed
    }
}

/// Controller for benchmark sessions. Clones share the same session.
#[derive(Clone)]
pub struct SessionController {
    engine: Arc<dyn BenchmarkEngine>,
    options: SessionOptions,
    inner: Arc<Mutex<Inner>>,
}

impl SessionController {
    pub fn new(engine: Arc<dyn BenchmarkEngine>, options: SessionOptions) -> Self {
        let buffer = SamplerBuffer::new(options.buffer_capacity);
        SessionController {
            engine,
            options,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::new(),
                config: None,
                buffer,
                results: None,
                run_id: 0,
                samples_seen: 0,
                tick_in_flight: None,
                poller: None,
                disarmed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new run.
    ///
    /// Rejected with `AlreadyRunning` (state untouched) unless the controller
    /// is at rest. A single start request is issued; on failure the phase
    /// reverts to Idle and the cause is returned without retrying.
    pub async fn start(&self, config: SessionConfig) -> Result<(), StartError> {
        config.validate().map_err(StartError::InvalidConfig)?;

        let run_id = {
            let mut inner = self.lock();
            if inner.disarmed {
                return Err(StartError::Disarmed);
            }
            if !inner.state.phase.is_at_rest() {
                return Err(StartError::AlreadyRunning(
                    inner.state.phase.as_str().to_string(),
                ));
            }
            inner.stop_poller();
            inner.run_id += 1;
            inner.state = SessionState {
                phase: inner.state.phase,
                ..SessionState::new()
            };
            inner.apply_transition(SessionPhase::Starting);
            inner.config = Some(config.clone());
            inner.buffer = SamplerBuffer::new(self.options.buffer_capacity);
            inner.results = None;
            inner.samples_seen = 0;
            inner.tick_in_flight = None;
            inner.run_id
        };

        log::info!(
            "[Session] Starting run #{}: {} {:?} for {}s",
            run_id,
            config.job_kind,
            config.mode,
            config.duration_sec
        );

        match self.engine.start_job(&config).await {
            Err(e) => {
                log::warn!("[Session] Start request for run #{} failed: {}", run_id, e);
                let mut inner = self.lock();
                if inner.run_id == run_id && !inner.state.phase.is_at_rest() {
                    inner.apply_transition(SessionPhase::Idle);
                    inner.state.last_error = Some(e.to_string());
                }
                Err(StartError::from_client(e))
            }
            Ok(ack) => {
                let mut inner = self.lock();
                if inner.run_id == run_id && inner.disarmed {
                    log::warn!("[Session] Run #{} accepted after shutdown began, not following it", run_id);
                    if !inner.state.phase.is_at_rest() {
                        inner.apply_transition(SessionPhase::Idle);
                    }
                    return Err(StartError::Disarmed);
                }
                if !inner.accepts(run_id) {
                    log::debug!("[Session] Start ack for superseded run #{} ignored", run_id);
                    return Ok(());
                }
                if ack.already_running() {
                    log::warn!("[Session] Engine reports a job already running; following it");
                }
                match inner.state.phase {
                    SessionPhase::Starting => inner.apply_transition(SessionPhase::Running),
                    // stop() raced the start: keep Stopping, the loop observes the halt
                    SessionPhase::Stopping => {}
                    _ => return Ok(()),
                }
                let poller = self.arm(run_id);
                inner.poller = Some(poller);
                Ok(())
            }
        }
    }

    fn arm(&self, run_id: u64) -> PeriodicTask {
        let controller = self.clone();
        PeriodicTask::spawn("session-poll", self.options.poll_interval, move || {
            let controller = controller.clone();
            async move { controller.tick(Some(run_id)).await }
        })
    }

    /// Ask the engine to halt the current run.
    ///
    /// A no-op at rest or when a stop is already pending. The phase moves to
    /// Stopping; the poll loop, not this call, observes the terminal state.
    pub async fn stop(&self) -> Result<(), StopError> {
        let run_id = {
            let mut inner = self.lock();
            match inner.state.phase {
                phase if phase.is_at_rest() => return Ok(()),
                SessionPhase::Stopping => return Ok(()),
                _ => {}
            }
            inner.apply_transition(SessionPhase::Stopping);
            inner.run_id
        };

        log::info!("[Session] Stop requested for run #{}", run_id);
        if let Err(e) = self.engine.stop_job().await {
            log::warn!("[Session] Stop request for run #{} failed: {}", run_id, e);
            let mut inner = self.lock();
            if inner.run_id == run_id {
                inner.state.last_error = Some(e.to_string());
            }
            return Err(StopError::from_client(e));
        }
        Ok(())
    }

    /// Run one poll tick for the current run.
    ///
    /// The poll loop calls this on its own; it is public so hosts without a
    /// timer can drive the controller. At most one tick is in flight.
    pub async fn poll_tick(&self) -> TickControl {
        self.tick(None).await
    }

    async fn tick(&self, expected_run: Option<u64>) -> TickControl {
        let run_id = {
            let mut inner = self.lock();
            if let Some(expected) = expected_run {
                if expected != inner.run_id {
                    return TickControl::Stop;
                }
            }
            if inner.disarmed || !inner.state.phase.is_polling() {
                return TickControl::Stop;
            }
            if inner.tick_in_flight == Some(inner.run_id) {
                return TickControl::Continue;
            }
            inner.tick_in_flight = Some(inner.run_id);
            inner.run_id
        };

        let (status, samples) = futures::join!(self.engine.status(), self.engine.samples());

        let job_kind = {
            let mut inner = self.lock();
            if inner.tick_in_flight == Some(run_id) {
                inner.tick_in_flight = None;
            }
            if !inner.accepts(run_id) || !inner.state.phase.is_polling() {
                log::debug!("[Session] Late poll response for run #{} discarded", run_id);
                return TickControl::Stop;
            }

            let (status, samples) = match (status, samples) {
                (Ok(status), Ok(samples)) => (status, samples),
                (Err(e), _) | (_, Err(e)) => {
                    log::warn!("[Session] Poll tick for run #{} failed: {}", run_id, e);
                    return TickControl::Continue;
                }
            };

            inner.state.progress_pct = status.progress.clamp(0.0, 100.0);
            if status.iterations < inner.state.iteration_count {
                log::warn!(
                    "[Session] Engine iteration count went backwards ({} -> {}), keeping {}",
                    inner.state.iteration_count,
                    status.iterations,
                    inner.state.iteration_count
                );
            } else {
                inner.state.iteration_count = status.iterations;
            }
            if status.workload_type.is_some() {
                inner.state.workload_label = status.workload_type.clone();
            }

            // The engine returns every sample of the run; only ingest the tail
            if samples.len() < inner.samples_seen {
                log::debug!("[Session] Engine sample list shrank, re-ingesting from the start");
                inner.samples_seen = 0;
            }
            let seen = inner.samples_seen;
            for sample in &samples[seen..] {
                inner.buffer.ingest(sample);
            }
            inner.samples_seen = samples.len();

            if status.running {
                return TickControl::Continue;
            }

            log::info!(
                "[Session] Run #{} finished after {} iterations",
                run_id,
                inner.state.iteration_count
            );
            inner.apply_transition(SessionPhase::Completed);
            inner.state.results_pending = true;
            inner.stop_poller();
            inner
                .config
                .as_ref()
                .map(|c| c.job_kind)
                .unwrap_or(JobKind::Gemm)
        };

        self.fetch_results(run_id, job_kind).await;
        TickControl::Stop
    }

    /// Fetch final results once; a failure marks the run Failed without retry.
    async fn fetch_results(&self, run_id: u64, job_kind: JobKind) {
        let outcome = match self.engine.results().await {
            Ok(payload) => FinalResults::decode(job_kind, payload),
            Err(e) => Err(e.to_string()),
        };

        let mut inner = self.lock();
        if inner.run_id != run_id {
            return;
        }
        inner.state.results_pending = false;
        if inner.state.phase != SessionPhase::Completed {
            return;
        }
        match outcome {
            Ok(results) => {
                log::info!("[Session] Results for run #{} stored", run_id);
                inner.results = Some(results);
            }
            Err(e) => {
                log::warn!("[Session] Results fetch for run #{} failed: {}", run_id, e);
                inner.apply_transition(SessionPhase::Failed);
                inner.state.last_error = Some(e);
            }
        }
    }

    /// Non-blocking snapshot of the session state. Never touches the network.
    pub fn status(&self) -> SessionState {
        self.lock().state.clone()
    }

    /// Owned copy of one sampler channel.
    pub fn samples(&self, channel: MetricChannel) -> Vec<ChannelPoint> {
        self.lock().buffer.snapshot(channel)
    }

    /// Final results of the last completed run.
    pub fn results(&self) -> Option<FinalResults> {
        self.lock().results.clone()
    }

    /// Configuration of the current or last run.
    pub fn config(&self) -> Option<SessionConfig> {
        self.lock().config.clone()
    }

    /// True while a poll loop is armed.
    pub fn is_polling(&self) -> bool {
        self.lock()
            .poller
            .as_ref()
            .map_or(false, |p| !p.is_cancelled())
    }

    /// Return to Idle, dropping results and samples. Only allowed at rest.
    pub fn reset(&self) -> Result<(), String> {
        let mut inner = self.lock();
        if !inner.state.phase.is_at_rest() {
            return Err(format!(
                "Cannot reset while session is {}",
                inner.state.phase.as_str()
            ));
        }
        inner.state = SessionState::new();
        inner.config = None;
        inner.results = None;
        inner.buffer.clear();
        inner.samples_seen = 0;
        Ok(())
    }

    /// Permanently stop polling: the server is going away.
    ///
    /// Any tick still in flight is discarded when it returns.
    pub fn disarm(&self) {
        let mut inner = self.lock();
        if !inner.disarmed {
            inner.disarmed = true;
            inner.stop_poller();
            log::info!("[Session] Poll loop disarmed");
        }
    }

    pub fn is_disarmed(&self) -> bool {
        self.lock().disarmed
    }

    /// Saved baseline for `kind`, if the engine has one.
    pub async fn baseline(&self, kind: JobKind) -> Result<Option<Baseline>, crate::error::ClientError> {
        self.engine.baseline(kind).await
    }
}

#[cfg(test)]
mod tests;
