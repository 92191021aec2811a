//! reqwest implementation of the benchmark engine contract.

use super::BenchmarkEngine;
use crate::error::ClientError;
use crate::http::{build_client, join_url, send_json, send_unit};
use crate::models::{
    Baseline, EngineStatus, JobKind, Sample, SamplesResponse, SessionConfig, StartAck,
};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::time::Duration;

/// HTTP client for the benchmark engine's `/benchmark/*` endpoints.
#[derive(Clone, Debug)]
pub struct HttpEngineClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngineClient {
    /// # Arguments
    /// * `base_url` - API root, e.g. `http://127.0.0.1:8090/api`
    /// * `request_timeout` - upper bound for any single request
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ClientError> {
        Ok(HttpEngineClient {
            client: build_client(request_timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }
}

impl BenchmarkEngine for HttpEngineClient {
    fn start_job<'a>(&'a self, config: &'a SessionConfig) -> BoxFuture<'a, Result<StartAck, ClientError>> {
        async move {
            log::debug!("[Engine] POST /benchmark/start ({} {:?})", config.job_kind, config.mode);
            let request = self
                .client
                .post(self.url("/benchmark/start"))
                .query(&config.to_query());
            send_json::<StartAck>(request).await
        }
        .boxed()
    }

    fn stop_job(&self) -> BoxFuture<'_, Result<(), ClientError>> {
        async move {
            log::debug!("[Engine] POST /benchmark/stop");
            send_unit(self.client.post(self.url("/benchmark/stop"))).await
        }
        .boxed()
    }

    fn status(&self) -> BoxFuture<'_, Result<EngineStatus, ClientError>> {
        async move { send_json(self.client.get(self.url("/benchmark/status"))).await }.boxed()
    }

    fn samples(&self) -> BoxFuture<'_, Result<Vec<Sample>, ClientError>> {
        async move {
            let body: SamplesResponse =
                send_json(self.client.get(self.url("/benchmark/samples"))).await?;
            Ok(body.samples)
        }
        .boxed()
    }

    fn results(&self) -> BoxFuture<'_, Result<Value, ClientError>> {
        async move { send_json(self.client.get(self.url("/benchmark/results"))).await }.boxed()
    }

    fn baseline(&self, kind: JobKind) -> BoxFuture<'_, Result<Option<Baseline>, ClientError>> {
        async move {
            let request = self
                .client
                .get(self.url("/benchmark/baseline"))
                .query(&[("benchmark_type", kind.as_str())]);
            let body: Value = send_json(request).await?;
            Baseline::decode(body).map_err(ClientError::Decode)
        }
        .boxed()
    }
}
