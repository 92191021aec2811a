//! Benchmark Engine access
//!
//! The engine executes the actual GPU workload. The session controller only
//! talks to it through the `BenchmarkEngine` trait so that tests can script
//! responses; `HttpEngineClient` is the production implementation.

pub mod client;

use crate::error::ClientError;
use crate::models::{Baseline, EngineStatus, JobKind, Sample, SessionConfig, StartAck};
use futures::future::BoxFuture;
use serde_json::Value;

pub use client::HttpEngineClient;

/// Operations the session controller needs from the benchmark engine.
pub trait BenchmarkEngine: Send + Sync {
    /// `POST /benchmark/start`
    fn start_job<'a>(&'a self, config: &'a SessionConfig) -> BoxFuture<'a, Result<StartAck, ClientError>>;

    /// `POST /benchmark/stop`
    fn stop_job(&self) -> BoxFuture<'_, Result<(), ClientError>>;

    /// `GET /benchmark/status`
    fn status(&self) -> BoxFuture<'_, Result<EngineStatus, ClientError>>;

    /// `GET /benchmark/samples`: every sample of the current run so far
    fn samples(&self) -> BoxFuture<'_, Result<Vec<Sample>, ClientError>>;

    /// `GET /benchmark/results`: opaque final payload
    fn results(&self) -> BoxFuture<'_, Result<Value, ClientError>>;

    /// `GET /benchmark/baseline`
    fn baseline(&self, kind: JobKind) -> BoxFuture<'_, Result<Option<Baseline>, ClientError>>;
}
