use super::*;
use crate::error::ClientError;
use crate::models::{EngineStatus, Sample, StartAck};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Engine double that replays scripted responses and records every call.
#[derive(Default)]
struct ScriptedEngine {
    start: Mutex<VecDeque<Result<StartAck, ClientError>>>,
    stop: Mutex<VecDeque<Result<(), ClientError>>>,
    statuses: Mutex<VecDeque<Result<EngineStatus, ClientError>>>,
    samples: Mutex<VecDeque<Result<Vec<Sample>, ClientError>>>,
    results: Mutex<VecDeque<Result<Value, ClientError>>>,
    status_gate: Mutex<Option<Arc<Notify>>>,
    start_gate: Mutex<Option<Arc<Notify>>>,
    results_gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedEngine {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    fn push_status(&self, status: Result<EngineStatus, ClientError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    fn push_samples(&self, samples: Result<Vec<Sample>, ClientError>) {
        self.samples.lock().unwrap().push_back(samples);
    }

    fn push_results(&self, results: Result<Value, ClientError>) {
        self.results.lock().unwrap().push_back(results);
    }
}

/// Park the caller until the test releases `gate`, if one is set.
async fn pass(gate: &Mutex<Option<Arc<Notify>>>) {
    let gate = gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }
}

impl BenchmarkEngine for ScriptedEngine {
    fn start_job<'a>(&'a self, _config: &'a SessionConfig) -> BoxFuture<'a, Result<StartAck, ClientError>> {
        async move {
            self.record("start");
            pass(&self.start_gate).await;
            self.start.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(StartAck {
                    status: "started".to_string(),
                })
            })
        }
        .boxed()
    }

    fn stop_job(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        async move {
            self.record("stop");
            self.stop.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
        .boxed()
    }

    fn status(&self) -> BoxFuture<'_, Result<EngineStatus, ClientError>> {
        async move {
            self.record("status");
            pass(&self.status_gate).await;
            self.statuses.lock().unwrap().pop_front().unwrap_or_else(|| Ok(running(0.0, 0)))
        }
        .boxed()
    }

    fn samples(&self) -> BoxFuture<'_, Result<Vec<Sample>, ClientError>> {
        async move {
            self.record("samples");
            self.samples.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
        }
        .boxed()
    }

    fn results(&self) -> BoxFuture<'_, Result<Value, ClientError>> {
        async move {
            self.record("results");
            pass(&self.results_gate).await;
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"status": "no_results"})))
        }
        .boxed()
    }

    fn baseline(&self, _kind: JobKind) -> BoxFuture<'_, Result<Option<Baseline>, ClientError>> {
        async move {
            self.record("baseline");
            Ok(None)
        }
        .boxed()
    }
}

fn running(progress: f64, iterations: u64) -> EngineStatus {
    EngineStatus {
        running: true,
        progress,
        iterations,
        workload_type: Some("GEMM 4096x4096 (cupy)".to_string()),
        phase: None,
    }
}

fn finished(iterations: u64) -> EngineStatus {
    EngineStatus {
        running: false,
        progress: 100.0,
        iterations,
        workload_type: None,
        phase: None,
    }
}

fn sample(elapsed_sec: f64, utilization_pct: f64) -> Sample {
    Sample {
        elapsed_sec,
        utilization_pct,
        temperature_c: 60.0,
        memory_used_mb: 1024.0,
        power_w: 200.0,
    }
}

fn transport() -> ClientError {
    ClientError::Transport("connection refused".to_string())
}

/// Controller whose own poll loop never fires; tests drive it with `poll_tick`.
fn manual(engine: &Arc<ScriptedEngine>) -> SessionController {
    SessionController::new(
        engine.clone(),
        SessionOptions {
            poll_interval: Duration::from_secs(3600),
            buffer_capacity: 50,
        },
    )
}

fn gemm() -> SessionConfig {
    SessionConfig::fixed(JobKind::Gemm, 15)
}

#[test]
fn test_phase_transition_table() {
    assert!(SessionPhase::Idle.can_transition_to(SessionPhase::Starting));
    assert!(!SessionPhase::Idle.can_transition_to(SessionPhase::Running));
    assert!(SessionPhase::Running.can_transition_to(SessionPhase::Stopping));
    assert!(SessionPhase::Completed.can_transition_to(SessionPhase::Failed));
    assert!(!SessionPhase::Stopping.can_transition_to(SessionPhase::Running));

    let mut state = SessionState::default();
    assert!(state.transition_to(SessionPhase::Completed).is_err());
    assert_eq!(state.phase, SessionPhase::Idle);
}

#[tokio::test]
async fn test_start_rejected_while_active_leaves_state_untouched() {
    let engine = Arc::new(ScriptedEngine::default());
    let controller = manual(&engine);

    controller.start(gemm()).await.unwrap();
    assert_eq!(controller.status().phase, SessionPhase::Running);
    assert!(controller.is_polling());

    let before = controller.status();
    let err = controller
        .start(SessionConfig::fixed(JobKind::Particle, 60))
        .await
        .unwrap_err();
    assert_eq!(err, StartError::AlreadyRunning("running".to_string()));
    assert_eq!(controller.status(), before);
    assert_eq!(controller.config().unwrap().job_kind, JobKind::Gemm);
    assert_eq!(engine.count("start"), 1);
}

#[tokio::test]
async fn test_invalid_config_never_reaches_engine() {
    let engine = Arc::new(ScriptedEngine::default());
    let controller = manual(&engine);

    let err = controller
        .start(SessionConfig::fixed(JobKind::Gemm, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, StartError::InvalidConfig(_)));
    assert_eq!(engine.count("start"), 0);
    assert_eq!(controller.status().phase, SessionPhase::Idle);
}

#[tokio::test]
async fn test_start_transport_failure_reverts_to_idle() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.start.lock().unwrap().push_back(Err(transport()));
    let controller = manual(&engine);

    let err = controller.start(gemm()).await.unwrap_err();
    assert!(matches!(err, StartError::TransportFailure(_)));

    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert!(state.last_error.unwrap().contains("connection refused"));
    assert!(!controller.is_polling());
    assert_eq!(engine.count("start"), 1);
}

#[tokio::test]
async fn test_start_server_error_is_reported() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.start.lock().unwrap().push_back(Err(ClientError::Server {
        status: 500,
        body: "CUDA init failed".to_string(),
    }));
    let controller = manual(&engine);

    let err = controller.start(gemm()).await.unwrap_err();
    assert!(matches!(err, StartError::ServerError(_)));
    assert_eq!(controller.status().phase, SessionPhase::Idle);
}

#[tokio::test]
async fn test_stop_at_rest_makes_no_request() {
    let engine = Arc::new(ScriptedEngine::default());
    let controller = manual(&engine);

    controller.stop().await.unwrap();
    assert_eq!(controller.status().phase, SessionPhase::Idle);
    assert_eq!(engine.count("stop"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_gemm_run_end_to_end() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(running(10.0, 5)));
    engine.push_samples(Ok(vec![sample(0.5, 90.0)]));
    engine.push_status(Ok(finished(20)));
    engine.push_samples(Ok(vec![sample(0.5, 90.0), sample(1.0, 95.0)]));
    engine.push_results(Ok(json!({
        "benchmark_type": "gemm",
        "iterations_completed": 20,
        "avg_tflops": 12.0,
        "peak_tflops": 13.5,
        "completed_full": true
    })));

    let controller = SessionController::new(engine.clone(), SessionOptions::default());
    controller.start(gemm()).await.unwrap();

    // First tick fires one interval after the start ack
    tokio::time::sleep(Duration::from_millis(600)).await;
    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Running);
    assert_eq!(state.progress(), Some(10.0));
    assert_eq!(state.iteration_count, 5);
    assert_eq!(state.workload_label.as_deref(), Some("GEMM 4096x4096 (cupy)"));
    assert_eq!(controller.samples(MetricChannel::Utilization).len(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Completed);
    assert_eq!(state.progress(), None);
    assert_eq!(state.iteration_count, 20);

    let results = controller.results().unwrap();
    assert_eq!(results.completed_full, Some(true));
    assert!(matches!(results.summary, Some(crate::models::JobResult::Gemm(_))));

    // Loop is cancelled: no further polls, results fetched exactly once
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.count("status"), 2);
    assert_eq!(engine.count("results"), 1);
    assert!(!controller.is_polling());
    assert_eq!(controller.samples(MetricChannel::Utilization).len(), 2);
}

#[tokio::test]
async fn test_failed_tick_keeps_phase_and_data() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(running(40.0, 8)));
    engine.push_samples(Ok(vec![sample(0.5, 80.0)]));
    engine.push_status(Err(transport()));
    engine.push_samples(Ok(vec![sample(0.5, 80.0), sample(1.0, 81.0)]));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    assert_eq!(controller.poll_tick().await, TickControl::Continue);
    assert_eq!(controller.poll_tick().await, TickControl::Continue);

    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Running);
    assert_eq!(state.progress(), Some(40.0));
    assert_eq!(state.iteration_count, 8);
    // Half-failed tick ingests nothing
    assert_eq!(controller.samples(MetricChannel::Power).len(), 1);
}

#[tokio::test]
async fn test_cumulative_samples_are_ingested_once() {
    let engine = Arc::new(ScriptedEngine::default());
    let a = sample(0.5, 50.0);
    let b = sample(1.0, 60.0);
    engine.push_samples(Ok(vec![a]));
    engine.push_samples(Ok(vec![a, b]));
    engine.push_samples(Ok(vec![a, b]));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    for _ in 0..3 {
        controller.poll_tick().await;
    }
    let values: Vec<f64> = controller
        .samples(MetricChannel::Utilization)
        .iter()
        .map(|p| p.value)
        .collect();
    assert_eq!(values, vec![50.0, 60.0]);
}

#[tokio::test]
async fn test_iteration_count_never_decreases() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(running(20.0, 10)));
    engine.push_status(Ok(running(25.0, 7)));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    controller.poll_tick().await;
    controller.poll_tick().await;
    let state = controller.status();
    assert_eq!(state.iteration_count, 10);
    assert_eq!(state.progress(), Some(25.0));
}

#[tokio::test]
async fn test_progress_is_clamped() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(running(130.0, 1)));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    controller.poll_tick().await;
    assert_eq!(controller.status().progress(), Some(100.0));
}

#[tokio::test]
async fn test_results_failure_marks_run_failed() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(finished(3)));
    engine.push_results(Err(ClientError::Server {
        status: 500,
        body: "boom".to_string(),
    }));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    assert_eq!(controller.poll_tick().await, TickControl::Stop);
    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Failed);
    assert!(state.last_error.unwrap().contains("500"));
    assert!(controller.results().is_none());
    assert_eq!(engine.count("results"), 1);
}

#[tokio::test]
async fn test_engine_reported_failure_marks_run_failed() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(finished(0)));
    engine.push_results(Ok(json!({"status": "failed", "error": "CUDA out of memory"})));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    controller.poll_tick().await;
    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Failed);
    assert_eq!(
        state.last_error.as_deref(),
        Some("run failed on the engine: CUDA out of memory")
    );
}

#[tokio::test]
async fn test_stop_waits_for_engine_to_report_terminal() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(running(50.0, 10)));
    engine.push_status(Ok(finished(11)));
    engine.push_results(Ok(json!({"benchmark_type": "gemm", "stop_reason": "user", "completed_full": false})));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    controller.stop().await.unwrap();
    assert_eq!(controller.status().phase, SessionPhase::Stopping);
    assert_eq!(controller.status().progress(), None);

    // Repeated stop is a no-op
    controller.stop().await.unwrap();
    assert_eq!(engine.count("stop"), 1);

    // Engine still running: stay in Stopping
    controller.poll_tick().await;
    assert_eq!(controller.status().phase, SessionPhase::Stopping);

    controller.poll_tick().await;
    assert_eq!(controller.status().phase, SessionPhase::Completed);
    assert_eq!(controller.results().unwrap().stop_reason.as_deref(), Some("user"));
}

#[tokio::test]
async fn test_stop_transport_failure_still_moves_to_stopping() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.stop.lock().unwrap().push_back(Err(transport()));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    let err = controller.stop().await.unwrap_err();
    assert!(matches!(err, StopError::TransportFailure(_)));
    assert_eq!(controller.status().phase, SessionPhase::Stopping);
    assert!(controller.is_polling());
}

#[tokio::test]
async fn test_new_run_after_completion_clears_previous_data() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(finished(4)));
    engine.push_samples(Ok(vec![sample(0.5, 70.0)]));
    engine.push_results(Ok(json!({"benchmark_type": "gemm"})));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();
    controller.poll_tick().await;
    assert_eq!(controller.status().phase, SessionPhase::Completed);

    controller
        .start(SessionConfig::fixed(JobKind::Particle, 60))
        .await
        .unwrap();
    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Running);
    assert_eq!(state.iteration_count, 0);
    assert!(controller.results().is_none());
    assert!(controller.samples(MetricChannel::Temperature).is_empty());
}

#[tokio::test]
async fn test_reset_only_at_rest() {
    let engine = Arc::new(ScriptedEngine::default());
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();
    assert!(controller.reset().is_err());

    engine.push_status(Ok(finished(1)));
    controller.poll_tick().await;
    // no_results from the default script
    assert_eq!(controller.status().phase, SessionPhase::Failed);

    controller.reset().unwrap();
    assert_eq!(controller.status(), SessionState::default());
    assert!(controller.config().is_none());
}

#[tokio::test]
async fn test_concurrent_ticks_are_single_flight() {
    let engine = Arc::new(ScriptedEngine::default());
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    let gate = Arc::new(Notify::new());
    *engine.status_gate.lock().unwrap() = Some(gate.clone());

    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.poll_tick().await })
    };
    tokio::task::yield_now().await;

    assert_eq!(controller.poll_tick().await, TickControl::Continue);
    assert_eq!(engine.count("status"), 1);

    gate.notify_one();
    assert_eq!(first.await.unwrap(), TickControl::Continue);
}

#[tokio::test]
async fn test_disarm_discards_in_flight_tick() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(running(30.0, 9)));
    engine.push_samples(Ok(vec![sample(0.5, 99.0)]));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    let gate = Arc::new(Notify::new());
    *engine.status_gate.lock().unwrap() = Some(gate.clone());
    let pending = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.poll_tick().await })
    };
    tokio::task::yield_now().await;

    controller.disarm();
    gate.notify_one();
    assert_eq!(pending.await.unwrap(), TickControl::Stop);

    assert!(controller.is_disarmed());
    assert!(!controller.is_polling());
    assert_eq!(controller.status().iteration_count, 0);
    assert!(controller.samples(MetricChannel::Utilization).is_empty());

    // No new polls and no new runs once disarmed
    assert_eq!(controller.poll_tick().await, TickControl::Stop);
    assert_eq!(controller.start(gemm()).await, Err(StartError::Disarmed));
}

#[tokio::test]
async fn test_completed_run_is_unsettled_until_results_return() {
    let engine = Arc::new(ScriptedEngine::default());
    engine.push_status(Ok(finished(30)));
    engine.push_results(Err(transport()));
    let controller = manual(&engine);
    controller.start(gemm()).await.unwrap();

    let gate = Arc::new(Notify::new());
    *engine.results_gate.lock().unwrap() = Some(gate.clone());
    let pending = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.poll_tick().await })
    };
    tokio::task::yield_now().await;

    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Completed);
    assert!(state.results_pending);
    assert!(!state.is_settled());
    assert!(controller.results().is_none());

    gate.notify_one();
    assert_eq!(pending.await.unwrap(), TickControl::Stop);

    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Failed);
    assert!(!state.results_pending);
    assert!(state.is_settled());
    assert!(state.last_error.unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_disarm_during_start_request_returns_disarmed() {
    let engine = Arc::new(ScriptedEngine::default());
    let controller = manual(&engine);

    let gate = Arc::new(Notify::new());
    *engine.start_gate.lock().unwrap() = Some(gate.clone());
    let starting = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start(gemm()).await })
    };
    tokio::task::yield_now().await;
    assert_eq!(controller.status().phase, SessionPhase::Starting);

    controller.disarm();
    gate.notify_one();
    assert_eq!(starting.await.unwrap(), Err(StartError::Disarmed));

    let state = controller.status();
    assert_eq!(state.phase, SessionPhase::Idle);
    assert!(state.is_settled());
    assert!(!controller.is_polling());
}
