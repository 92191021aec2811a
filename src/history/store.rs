//! Telemetry Store access.

use crate::error::ClientError;
use crate::http::{build_client, join_url, send_json};
use crate::models::{HistoryPoint, HistoryResponse};
use futures::future::{BoxFuture, FutureExt};
use std::time::Duration;

/// Read side of the external store that persists metric history.
pub trait TelemetryStore: Send + Sync {
    /// `GET /history?metric=&hours=`; `hours` is a number or `lifetime`
    fn history<'a>(&'a self, metric: &'a str, hours: &'a str) -> BoxFuture<'a, Result<Vec<HistoryPoint>, ClientError>>;
}

/// reqwest implementation of `TelemetryStore`.
#[derive(Clone, Debug)]
pub struct HttpTelemetryStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTelemetryStore {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ClientError> {
        Ok(HttpTelemetryStore {
            client: build_client(request_timeout)?,
            base_url: base_url.into(),
        })
    }
}

impl TelemetryStore for HttpTelemetryStore {
    fn history<'a>(&'a self, metric: &'a str, hours: &'a str) -> BoxFuture<'a, Result<Vec<HistoryPoint>, ClientError>> {
        async move {
            log::debug!("[History] GET /history metric={} hours={}", metric, hours);
            let request = self
                .client
                .get(join_url(&self.base_url, "/history"))
                .query(&[("metric", metric), ("hours", hours)]);
            let body: HistoryResponse = send_json(request).await?;
            Ok(body.data)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_history_query_and_decode() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/history")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("metric".into(), "gpu_0_temperature".into()),
                Matcher::UrlEncoded("hours".into(), "24".into()),
            ]))
            .with_body(r#"{"data":[{"timestamp":"2026-05-01T10:00:00+00:00","value":61.5}]}"#)
            .create_async()
            .await;

        let store = HttpTelemetryStore::new(server.url(), Duration::from_secs(2)).unwrap();
        let points = store.history("gpu_0_temperature", "24").await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 61.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_data_field_is_empty() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/history")
            .match_query(Matcher::Any)
            .with_body("{}")
            .create_async()
            .await;

        let store = HttpTelemetryStore::new(server.url(), Duration::from_secs(2)).unwrap();
        assert!(store.history("cpu_percent", "lifetime").await.unwrap().is_empty());
    }
}
