//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all balancer handler
//! - Wire up middleware (tracing)
//! - Start one health checker per backend
//! - Bind server to listener and serve until shutdown
//! - Dispatch each request: select backend by path, then forward

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::BalancerConfig;
use crate::health::{spawn_health_checkers, HealthState};
use crate::http::client::{build_client, ClientError, UpstreamClient};
use crate::http::forward::ForwardingProxy;
use crate::http::response::{service_unavailable, FORWARD_FAILED_BODY};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{BackendPool, PoolError, ServerSelector};
use crate::observability::metrics;

/// Error starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid backend pool: {0}")]
    Pool(#[from] PoolError),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] ClientError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub selector: Arc<ServerSelector>,
    pub proxy: ForwardingProxy,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
    config: BalancerConfig,
    selector: Arc<ServerSelector>,
    client: UpstreamClient,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: BalancerConfig) -> Result<Self, ServerError> {
        let pool = BackendPool::from_addresses(&config.backends)?;
        let health = Arc::new(HealthState::new(pool.len()));
        let selector = Arc::new(ServerSelector::new(pool, health));

        let timeout = Duration::from_secs(config.timeouts.request_secs);
        let client = build_client(timeout)?;

        let state = AppState {
            selector: selector.clone(),
            proxy: ForwardingProxy::new(
                client.clone(),
                config.upstream.scheme,
                timeout,
                config.observability.trace_header,
            ),
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            config,
            selector,
            client,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Health checkers start first and are joined after the listener stops.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.selector.pool().len(),
            trace_header = self.config.observability.trace_header,
            scheme = %self.config.upstream.scheme,
            "HTTP server starting"
        );

        let checkers = spawn_health_checkers(
            self.selector.pool(),
            self.selector.health(),
            &self.client,
            self.config.upstream.scheme,
            &self.config.health_check,
            Duration::from_secs(self.config.timeouts.request_secs),
            &shutdown,
        );

        let mut stop = shutdown.subscribe();
        let served = axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                stop.wait().await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        // The listener can also stop on an I/O error; stop the checkers too.
        shutdown.trigger();
        for checker in checkers {
            if let Err(e) = checker.await {
                tracing::error!(error = %e, "Health checker task failed");
            }
        }

        served?;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Shared health table, indexed like the backend pool.
    pub fn health_state(&self) -> Arc<HealthState> {
        self.selector.health().clone()
    }

    /// The fully layered router, for serving without the checkers.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }
}

/// Main balancer handler.
/// Selects a backend from the request path and forwards the request.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let backend = match state.selector.select(&path) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::warn!(method = %method, path = %path, "No healthy backends");
            metrics::record_request(method.as_str(), 503, "none", start_time);
            return service_unavailable(e.to_string());
        }
    };

    let finished_method = method.clone();
    let finished_backend = backend.address().to_string();
    let on_finish = move |status: StatusCode| {
        metrics::record_request(finished_method.as_str(), status.as_u16(), &finished_backend, start_time);
    };

    match state.proxy.forward(backend, request, on_finish).await {
        Ok(response) => {
            tracing::debug!(
                method = %method,
                path = %path,
                backend = %backend,
                status = %response.status(),
                "Forwarded request"
            );
            response
        }
        Err(e) => {
            tracing::error!(method = %method, path = %path, backend = %backend, error = %e, "Failed to forward request");
            metrics::record_request(method.as_str(), 503, backend.address(), start_time);
            service_unavailable(FORWARD_FAILED_BODY)
        }
    }
}
