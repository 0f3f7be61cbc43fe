//! Request and response counters.
//!
//! Counters live in a registry owned by the server rather than the process-wide
//! default one, so two routers in one process never share numbers.

use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::{fmt, sync::Arc, time::Instant};

use super::{Interceptor, Next};

#[derive(Clone)]
pub struct RequestMetrics {
    registry: Registry,
    requests_received: IntCounter,
    responses_sent: IntCounter,
    responses_by_status: IntCounterVec,
    processing_time_us: IntCounter,
}

impl fmt::Debug for RequestMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestMetrics")
            .field("requests_received", &self.requests_received())
            .field("responses_sent", &self.responses_sent())
            .finish_non_exhaustive()
    }
}

impl RequestMetrics {
    /// # Errors
    /// Returns an error if a counter cannot be created or registered.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests_received = IntCounter::with_opts(Opts::new(
            "leadhub_http_requests_received_total",
            "Requests that entered the interceptor chain.",
        ))?;
        let responses_sent = IntCounter::with_opts(Opts::new(
            "leadhub_http_responses_sent_total",
            "Responses returned by the interceptor chain.",
        ))?;
        let responses_by_status = IntCounterVec::new(
            Opts::new(
                "leadhub_http_responses_sent_by_status_total",
                "Responses returned, partitioned by status code.",
            ),
            &["status_code"],
        )?;
        let processing_time_us = IntCounter::with_opts(Opts::new(
            "leadhub_http_processing_time_microseconds_total",
            "Time spent producing responses, in microseconds.",
        ))?;

        registry.register(Box::new(requests_received.clone()))?;
        registry.register(Box::new(responses_sent.clone()))?;
        registry.register(Box::new(responses_by_status.clone()))?;
        registry.register(Box::new(processing_time_us.clone()))?;

        Ok(Self {
            registry,
            requests_received,
            responses_sent,
            responses_by_status,
            processing_time_us,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    #[must_use]
    pub fn requests_received(&self) -> u64 {
        self.requests_received.get()
    }

    #[must_use]
    pub fn responses_sent(&self) -> u64 {
        self.responses_sent.get()
    }

    #[must_use]
    pub fn responses_with_status(&self, status: u16) -> u64 {
        self.responses_by_status
            .with_label_values(&[status.to_string().as_str()])
            .get()
    }

    #[must_use]
    pub fn processing_time_us(&self) -> u64 {
        self.processing_time_us.get()
    }

    fn observe(&self, status: u16, started: Instant) {
        self.responses_sent.inc();
        self.responses_by_status
            .with_label_values(&[status.to_string().as_str()])
            .inc();
        let elapsed = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.processing_time_us.inc_by(elapsed);
    }
}

/// Counts every request and the status of its response.
///
/// Sits first in the global chain so short-circuited and panicking requests are
/// counted too.
#[derive(Clone, Debug)]
pub struct Metrics {
    metrics: Arc<RequestMetrics>,
}

impl Metrics {
    pub fn new(metrics: Arc<RequestMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Interceptor for Metrics {
    async fn intercept(&self, request: Request, next: Next<'_>) -> Response {
        let started = Instant::now();
        self.metrics.requests_received.inc();

        let response = next.run(request).await;

        self.metrics.observe(response.status().as_u16(), started);
        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::interceptor::Chain;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn counts_requests_and_statuses() {
        let metrics = Arc::new(RequestMetrics::new().unwrap());
        let router = Chain::new()
            .with(Metrics::new(metrics.clone()))
            .layer(Router::new().route("/", get(|| async { "ok" })));

        for uri in ["/", "/", "/missing"] {
            router.clone().oneshot(request(uri)).await.unwrap();
        }

        assert_eq!(metrics.requests_received(), 3);
        assert_eq!(metrics.responses_sent(), 3);
        assert_eq!(metrics.responses_with_status(StatusCode::OK.as_u16()), 2);
        assert_eq!(metrics.responses_with_status(StatusCode::NOT_FOUND.as_u16()), 1);
        assert_eq!(metrics.registry().gather().len(), 4);
    }

    #[test]
    fn registries_are_independent() {
        let first = RequestMetrics::new().unwrap();
        let second = RequestMetrics::new().unwrap();
        first.requests_received.inc();
        assert_eq!(first.requests_received(), 1);
        assert_eq!(second.requests_received(), 0);
    }
}
