//! Prometheus metrics for ldapgate
//!
//! Exposes metrics at the admin listener's `/metrics` endpoint in Prometheus
//! format.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use ldapgate_auth::AuthDecision;
use ldapgate_core::{Error, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Metric names
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "ldapgate_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "ldapgate_http_request_duration_seconds";

    // Verification metrics
    pub const DECISIONS_TOTAL: &str = "ldapgate_decisions_total";
    pub const VERIFY_DURATION_SECONDS: &str = "ldapgate_verify_duration_seconds";
    pub const DIRECTORY_FAULTS_TOTAL: &str = "ldapgate_directory_faults_total";

    // System metrics
    pub const UPTIME_SECONDS: &str = "ldapgate_uptime_seconds";
    pub const INFO: &str = "ldapgate_info";
}

/// Metrics recorder
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
    start_time: Instant,
}

impl MetricsRecorder {
    /// Install the process-wide Prometheus recorder.
    ///
    /// Fails if another recorder is already installed.
    pub fn install() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| Error::Other(e.into()))?;

        gauge!(names::INFO, "version" => ldapgate_core::VERSION).set(1.0);

        Ok(Self {
            handle,
            start_time: Instant::now(),
        })
    }

    /// A recorder that is not installed globally; metric macros stay no-ops.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();

        Self {
            handle: recorder.handle(),
            start_time: Instant::now(),
        }
    }

    /// Get metrics output in Prometheus format
    pub fn render(&self) -> String {
        gauge!(names::UPTIME_SECONDS).set(self.start_time.elapsed().as_secs_f64());

        self.handle.render()
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, method: &str, status: u16, duration_secs: f64) {
        let status_class = format!("{}xx", status / 100);

        counter!(
            names::HTTP_REQUESTS_TOTAL,
            "method" => method.to_string(),
            "status" => status.to_string(),
            "status_class" => status_class
        )
        .increment(1);

        histogram!(
            names::HTTP_REQUEST_DURATION_SECONDS,
            "method" => method.to_string()
        )
        .record(duration_secs);
    }

    /// Record one verification decision
    pub fn record_decision(&self, decision: &AuthDecision, duration_secs: f64) {
        counter!(names::DECISIONS_TOTAL, "decision" => decision.label()).increment(1);

        histogram!(names::VERIFY_DURATION_SECONDS, "decision" => decision.label())
            .record(duration_secs);

        if let AuthDecision::Failed(e) = decision {
            counter!(
                names::DIRECTORY_FAULTS_TOTAL,
                "fault" => e.fault().as_str(),
                "code" => e.code()
            )
            .increment(1);
        }
    }
}

/// Axum middleware for recording HTTP metrics
pub async fn metrics_middleware(
    State(metrics): State<Arc<MetricsRecorder>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    metrics.record_http_request(&method, status, duration);

    debug!(
        method = %method,
        status = %status,
        duration_ms = %(duration * 1000.0),
        "Request completed"
    );

    response
}

/// Handler for /metrics endpoint
pub async fn metrics_handler(State(metrics): State<Arc<MetricsRecorder>>) -> impl IntoResponse {
    let output = metrics.render();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}
