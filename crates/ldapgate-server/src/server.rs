//! ldapgate HTTP server

use axum::{http::HeaderValue, middleware, routing::get, Json, Router};
use ldapgate_auth::Authenticator;
use ldapgate_core::{Error, GateConfig, HttpConfig, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info, warn};

use crate::handler::{challenge_header, verify_request};
use crate::metrics::{metrics_handler, metrics_middleware, MetricsRecorder};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
    pub http: Arc<HttpConfig>,
    pub challenge: HeaderValue,
    pub metrics: Arc<MetricsRecorder>,
}

impl AppState {
    pub fn new(
        http: &HttpConfig,
        authenticator: Authenticator,
        metrics: Arc<MetricsRecorder>,
    ) -> Result<Self> {
        let challenge = challenge_header(&http.realm).ok_or_else(|| {
            Error::Config(format!("realm {:?} is not a valid header value", http.realm))
        })?;

        Ok(Self {
            authenticator: Arc::new(authenticator),
            http: Arc::new(http.clone()),
            challenge,
            metrics,
        })
    }
}

/// Router for the verification listener: every method on every path
pub fn auth_router(state: AppState) -> Router {
    let metrics = state.metrics.clone();

    Router::new()
        .fallback(verify_request)
        .layer(middleware::from_fn_with_state(metrics, metrics_middleware))
        // Headers stay out of spans, the Authorization header among them
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .with_state(state)
}

/// Router for the admin listener
pub fn admin_router(metrics: Arc<MetricsRecorder>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": ldapgate_core::VERSION,
    }))
}

/// ldapgate server
pub struct AuthServer {
    config: GateConfig,
}

impl AuthServer {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        self.config.validate()?;

        let metrics = Arc::new(MetricsRecorder::install()?);
        info!("Prometheus metrics initialized");

        let directory = Arc::new(self.config.directory.clone());
        info!(
            url = %directory.url(),
            base_dn = %directory.base_dn,
            required_group = directory.required_group.as_deref().unwrap_or("-"),
            "Directory configured"
        );

        let authenticator =
            Authenticator::ldap(directory).with_deadline(self.config.server.verify_timeout());
        let state = AppState::new(&self.config.http, authenticator, metrics.clone())?;

        let addr = format!("{}:{}", self.config.server.bind_address, self.config.server.port);
        let listener = TcpListener::bind(addr.as_str()).await?;
        info!("ldapgate listening on http://{}", addr);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let admin = match self.config.server.admin_port {
            Some(port) => {
                let admin_addr = format!("{}:{}", self.config.server.bind_address, port);
                let admin_listener = TcpListener::bind(admin_addr.as_str()).await?;
                info!("Admin endpoints at http://{}/health and /metrics", admin_addr);

                let app = admin_router(metrics);
                let rx = shutdown_rx.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = axum::serve(admin_listener, app)
                        .with_graceful_shutdown(wait_for(rx))
                        .await
                    {
                        error!("Admin listener failed: {}", e);
                    }
                }))
            }
            None => None,
        };

        let app = auth_router(state);
        let shutdown = async move {
            wait_for_shutdown().await;
            let _ = shutdown_tx.send(true);
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(handle) = admin {
            let _ = handle.await;
        }

        info!("ldapgate stopped");
        Ok(())
    }
}

async fn wait_for(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("Received Ctrl-C, shutting down");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl-C, shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use ldapgate_core::DirectoryConfig;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health() {
        let app = admin_router(Arc::new(MetricsRecorder::detached()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = admin_router(Arc::new(MetricsRecorder::detached()));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_state_rejects_bad_realm() {
        let http = HttpConfig {
            realm: "line\nbreak".to_string(),
            ..Default::default()
        };
        let authenticator = Authenticator::ldap(Arc::new(DirectoryConfig::default()));

        let result = AppState::new(&http, authenticator, Arc::new(MetricsRecorder::detached()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_run_rejects_invalid_config() {
        let result = AuthServer::new(GateConfig::default()).run().await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
