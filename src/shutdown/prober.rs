//! Liveness Prober
//!
//! Confirms that a remote process has exited. Only a transport failure (no
//! response at all, including the probe's own timeout firing) counts as proof
//! of death; any HTTP response, even an error status, means something is
//! still answering on the port.

use super::HostProbe;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound for a single liveness request.
pub const MAX_PROBE_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Result of a probe run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// The host stopped answering after `attempts` probes
    Confirmed { attempts: u32 },
    /// The host still answered when the budget ran out
    TimedOut { attempts: u32 },
}

impl ProbeOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, ProbeOutcome::Confirmed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ProbeOutcome::Confirmed { attempts } | ProbeOutcome::TimedOut { attempts } => *attempts,
        }
    }
}

/// Number of probes that fit in `budget` at one probe per `interval`.
pub fn attempts_for(budget: Duration, interval: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    let attempts = (budget.as_millis() + interval_ms - 1) / interval_ms;
    attempts.clamp(1, u32::MAX as u128) as u32
}

/// Repeated bounded-timeout probes against a host.
#[derive(Clone)]
pub struct LivenessProber {
    host: Arc<dyn HostProbe>,
    consecutive_failures: u32,
}

impl LivenessProber {
    pub fn new(host: Arc<dyn HostProbe>) -> Self {
        LivenessProber {
            host,
            consecutive_failures: 1,
        }
    }

    /// Require `n` consecutive unreachable probes before confirming (minimum 1).
    pub fn with_consecutive_failures(mut self, n: u32) -> Self {
        self.consecutive_failures = n.max(1);
        self
    }

    /// Probe until the host is confirmed dead or the budget is spent.
    ///
    /// Each attempt is bounded by `min(interval, 2s)`; the prober sleeps one
    /// interval between attempts.
    pub async fn probe(&self, budget: Duration, interval: Duration) -> ProbeOutcome {
        let interval = interval.max(Duration::from_millis(1));
        let attempts = attempts_for(budget, interval);
        let per_probe = interval.min(MAX_PROBE_TIMEOUT);
        let mut streak = 0u32;

        log::info!(
            "[Prober] Waiting for host to stop: up to {} probes every {:?}",
            attempts,
            interval
        );

        for attempt in 1..=attempts {
            let unreachable = match tokio::time::timeout(per_probe, self.host.liveness(per_probe)).await {
                Err(_) => {
                    log::debug!("[Prober] Probe {}/{} timed out", attempt, attempts);
                    true
                }
                Ok(Err(e)) if e.is_transport() => {
                    log::debug!("[Prober] Probe {}/{} unreachable: {}", attempt, attempts, e);
                    true
                }
                Ok(Err(e)) => {
                    log::debug!("[Prober] Probe {}/{} answered with error: {}", attempt, attempts, e);
                    false
                }
                Ok(Ok(())) => {
                    log::debug!("[Prober] Probe {}/{}: host still up", attempt, attempts);
                    false
                }
            };

            if unreachable {
                streak += 1;
                if streak >= self.consecutive_failures {
                    log::info!("[Prober] Host confirmed stopped after {} probes", attempt);
                    return ProbeOutcome::Confirmed { attempts: attempt };
                }
            } else {
                streak = 0;
            }

            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        log::warn!("[Prober] Host still answering after {} probes", attempts);
        ProbeOutcome::TimedOut { attempts }
    }
}
