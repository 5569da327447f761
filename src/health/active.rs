//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe each backend, one independent task per backend
//! - Update the shared health table with the outcome
//!
//! A backend is healthy iff `GET {scheme}://{backend}{path}` completes within
//! the timeout with status exactly `200 OK`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::uri::PathAndQuery;
use axum::http::{header, Request, StatusCode};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{HealthCheckConfig, UpstreamScheme};
use crate::health::schedule::Schedule;
use crate::health::state::HealthState;
use crate::http::client::UpstreamClient;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::load_balancer::{Backend, BackendPool};
use crate::observability::metrics;

/// Probes a single backend and records the result.
#[derive(Clone)]
pub struct HealthChecker {
    backend: Backend,
    state: Arc<HealthState>,
    client: UpstreamClient,
    scheme: UpstreamScheme,
    path: PathAndQuery,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(
        backend: Backend,
        state: Arc<HealthState>,
        client: UpstreamClient,
        scheme: UpstreamScheme,
        path: PathAndQuery,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            state,
            client,
            scheme,
            path,
            timeout,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Probe the backend without touching the health table.
    pub async fn probe(&self) -> bool {
        tracing::debug!(backend = %self.backend, "Checking health");

        let uri = match self.backend.uri(self.scheme, self.path.clone()) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(backend = %self.backend, error = %e, "Failed to build health check URI");
                return false;
            }
        };
        let request = match Request::get(uri)
            .header(header::USER_AGENT, "sticky-balancer-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(backend = %self.backend, error = %e, "Failed to build health check request");
                return false;
            }
        };

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status() == StatusCode::OK => {
                tracing::debug!(backend = %self.backend, "Health check succeeded");
                true
            }
            Ok(Ok(response)) => {
                tracing::warn!(backend = %self.backend, status = %response.status(), "Health check failed: non-OK status");
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(backend = %self.backend, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(backend = %self.backend, timeout = ?self.timeout, "Health check failed: timeout");
                false
            }
        }
    }

    /// Probe once and write the outcome into the health table.
    pub async fn check_once(&self) -> bool {
        let healthy = self.probe().await;
        let was_healthy = self.state.set_healthy(self.backend.index(), healthy);

        if healthy != was_healthy {
            if healthy {
                tracing::info!(backend = %self.backend, "Backend became healthy");
            } else {
                tracing::warn!(backend = %self.backend, "Backend became unhealthy");
            }
        }
        metrics::record_backend_health(self.backend.address(), healthy);
        healthy
    }

    /// Check on `schedule` until shutdown.
    pub async fn run(self, schedule: Schedule, shutdown: ShutdownSignal) {
        tracing::info!(
            backend = %self.backend,
            interval = ?schedule.period(),
            path = %self.path,
            "Health checker starting"
        );
        let this = &self;
        schedule
            .run(
                move || async move {
                    this.check_once().await;
                },
                shutdown,
            )
            .await;
        tracing::info!(backend = %self.backend, "Health checker stopped");
    }
}

/// Spawn one checker task per backend in `pool`.
pub fn spawn_health_checkers(
    pool: &BackendPool,
    state: &Arc<HealthState>,
    client: &UpstreamClient,
    scheme: UpstreamScheme,
    config: &HealthCheckConfig,
    timeout: Duration,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    let path = PathAndQuery::try_from(config.path.as_str()).unwrap_or_else(|e| {
        tracing::warn!(path = %config.path, error = %e, "Invalid health check path, using /health");
        PathAndQuery::from_static("/health")
    });
    let schedule = Schedule::every(Duration::from_secs(config.interval_secs));

    pool.iter()
        .map(|backend| {
            let checker = HealthChecker::new(
                backend.clone(),
                state.clone(),
                client.clone(),
                scheme,
                path.clone(),
                timeout,
            );
            tokio::spawn(checker.run(schedule, shutdown.subscribe()))
        })
        .collect()
}
