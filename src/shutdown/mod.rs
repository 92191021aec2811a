//! Shutdown Handshake
//!
//! Orchestrates a remote server's graceful shutdown. The coordinator posts a
//! terminate request and then relies on the `LivenessProber` to tell "server
//! accepted and is going down" apart from "server still running". A transport
//! failure on the terminate request itself is ambiguous (the server may have
//! died before it could answer) and is folded into the confirmation path.

pub mod prober;

pub use prober::{attempts_for, LivenessProber, ProbeOutcome, MAX_PROBE_TIMEOUT};

use crate::error::{ClientError, ShutdownError};
use crate::http::{build_client, join_url, send_unit};
use crate::session::SessionController;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// What the handshake needs from the host being shut down.
pub trait HostProbe: Send + Sync {
    /// `POST /shutdown`
    fn terminate(&self) -> BoxFuture<'_, Result<(), ClientError>>;

    /// `GET /status` bounded by `timeout`; the body is ignored
    fn liveness(&self, timeout: Duration) -> BoxFuture<'_, Result<(), ClientError>>;
}

/// reqwest implementation of `HostProbe`.
#[derive(Clone, Debug)]
pub struct HttpHostClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHostClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ClientError> {
        Ok(HttpHostClient {
            client: build_client(request_timeout)?,
            base_url: base_url.into(),
        })
    }
}

impl HostProbe for HttpHostClient {
    fn terminate(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        async move {
            log::debug!("[Shutdown] POST /shutdown");
            send_unit(self.client.post(join_url(&self.base_url, "/shutdown"))).await
        }
        .boxed()
    }

    fn liveness(&self, timeout: Duration) -> BoxFuture<'_, Result<(), ClientError>> {
        async move {
            let request = self
                .client
                .get(join_url(&self.base_url, "/status"))
                .timeout(timeout);
            send_unit(request).await
        }
        .boxed()
    }
}

/// Phases of the shutdown handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPhase {
    Idle,
    /// Terminate request in flight
    AwaitingAck,
    /// Server acknowledged the terminate request
    Terminating,
    /// Terminate request got no response at all
    Unreachable,
    /// Liveness prober running
    ConfirmingStopped,
    /// `confirmed: false` means the budget ran out ("stopped (assumed)")
    Stopped { confirmed: bool },
}

impl ShutdownPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownPhase::Idle => "idle",
            ShutdownPhase::AwaitingAck => "awaiting_ack",
            ShutdownPhase::Terminating => "terminating",
            ShutdownPhase::Unreachable => "unreachable",
            ShutdownPhase::ConfirmingStopped => "confirming_stopped",
            ShutdownPhase::Stopped { confirmed: true } => "stopped",
            ShutdownPhase::Stopped { confirmed: false } => "stopped (assumed)",
        }
    }

    pub fn can_transition_to(&self, next: ShutdownPhase) -> bool {
        matches!(
            (self, next),
            (ShutdownPhase::Idle, ShutdownPhase::AwaitingAck)
                | (ShutdownPhase::AwaitingAck, ShutdownPhase::Terminating)
                | (ShutdownPhase::AwaitingAck, ShutdownPhase::Unreachable)
                | (ShutdownPhase::AwaitingAck, ShutdownPhase::Idle)
                | (ShutdownPhase::Terminating, ShutdownPhase::ConfirmingStopped)
                | (ShutdownPhase::Unreachable, ShutdownPhase::ConfirmingStopped)
                | (ShutdownPhase::ConfirmingStopped, ShutdownPhase::Stopped { .. })
        )
    }
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by `observe()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShutdownState {
    pub phase: ShutdownPhase,
    /// Whether the server acknowledged the terminate request
    pub acknowledged: Option<bool>,
    pub probe: Option<ProbeOutcome>,
}

/// Timing of the confirmation phase.
#[derive(Debug, Clone)]
pub struct ShutdownOptions {
    pub timeout_budget: Duration,
    pub probe_interval: Duration,
    pub consecutive_failures: u32,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        ShutdownOptions {
            timeout_budget: Duration::from_secs(60),
            probe_interval: Duration::from_millis(1_000),
            consecutive_failures: 1,
        }
    }
}

struct Inner {
    state: ShutdownState,
    history: Vec<ShutdownPhase>,
}

impl Inner {
    fn enter(&mut self, next: ShutdownPhase) {
        if !self.state.phase.can_transition_to(next) {
            log::warn!(
                "[Shutdown] Invalid transition: {} -> {}",
                self.state.phase,
                next
            );
            return;
        }
        log::info!("[Shutdown] {} -> {}", self.state.phase, next);
        self.state.phase = next;
        self.history.push(next);
    }
}

/// Single-flight shutdown state machine. Clones share the same handshake.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    host: Arc<dyn HostProbe>,
    options: ShutdownOptions,
    session: Option<SessionController>,
    inner: Arc<Mutex<Inner>>,
}

impl ShutdownCoordinator {
    pub fn new(host: Arc<dyn HostProbe>, options: ShutdownOptions) -> Self {
        ShutdownCoordinator {
            host,
            options,
            session: None,
            inner: Arc::new(Mutex::new(Inner {
                state: ShutdownState {
                    phase: ShutdownPhase::Idle,
                    acknowledged: None,
                    probe: None,
                },
                history: vec![ShutdownPhase::Idle],
            })),
        }
    }

    /// Disarm this session's poll loop once the server is going away.
    pub fn with_session(mut self, session: SessionController) -> Self {
        self.session = Some(session);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run the whole handshake and return the final phase.
    ///
    /// Only an explicit refusal (HTTP error status on the terminate request)
    /// is an error; the coordinator then returns to Idle so the caller may
    /// try again.
    pub async fn initiate(&self) -> Result<ShutdownPhase, ShutdownError> {
        {
            let mut inner = self.lock();
            if inner.state.phase != ShutdownPhase::Idle {
                return Err(ShutdownError::AlreadyInProgress(
                    inner.state.phase.as_str().to_string(),
                ));
            }
            inner.state.acknowledged = None;
            inner.state.probe = None;
            inner.enter(ShutdownPhase::AwaitingAck);
        }

        let acknowledged = match self.host.terminate().await {
            Ok(()) => true,
            Err(ClientError::Server { status, body }) => {
                log::warn!("[Shutdown] Server refused shutdown with HTTP {}", status);
                self.lock().enter(ShutdownPhase::Idle);
                return Err(ShutdownError::Rejected { status, body });
            }
            Err(e) => {
                // No usable answer: the server may already be gone
                log::warn!("[Shutdown] Terminate request got no usable response: {}", e);
                false
            }
        };

        {
            let mut inner = self.lock();
            inner.state.acknowledged = Some(acknowledged);
            inner.enter(if acknowledged {
                ShutdownPhase::Terminating
            } else {
                ShutdownPhase::Unreachable
            });
        }
        if let Some(session) = &self.session {
            session.disarm();
        }

        self.lock().enter(ShutdownPhase::ConfirmingStopped);
        let prober = LivenessProber::new(self.host.clone())
            .with_consecutive_failures(self.options.consecutive_failures);
        let outcome = prober
            .probe(self.options.timeout_budget, self.options.probe_interval)
            .await;

        let done = ShutdownPhase::Stopped {
            confirmed: outcome.is_confirmed(),
        };
        let mut inner = self.lock();
        inner.state.probe = Some(outcome);
        inner.enter(done);
        Ok(done)
    }

    /// Current handshake state.
    pub fn observe(&self) -> ShutdownState {
        self.lock().state.clone()
    }

    /// Phases visited so far, starting with Idle.
    pub fn history(&self) -> Vec<ShutdownPhase> {
        self.lock().history.clone()
    }
}
