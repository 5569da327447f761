//! Request forwarding to a chosen backend.
//!
//! # Responsibilities
//! - Rewrite the inbound request onto the backend (scheme, authority, Host)
//! - Bound the whole exchange, head and body, by one request deadline
//! - Relay status, headers and a streamed body back to the caller
//!
//! # Design Decisions
//! - No retry here; failover already happened during selection
//! - The body is never buffered; a stream still open at the deadline is cut
//! - Dropping the handler future (client disconnect) cancels the outbound call
//! - Errors after the status line is sent can only be logged

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, HeaderValue};
use axum::http::uri::PathAndQuery;
use axum::http::{Request, StatusCode, Version};
use axum::response::Response;
use http_body_util::BodyExt;
use thiserror::Error;
use tokio::time::{self, Instant};

use crate::config::UpstreamScheme;
use crate::http::client::UpstreamClient;
use crate::http::deadline::DeadlineBody;
use crate::http::response::set_lb_from;
use crate::load_balancer::Backend;

/// Error forwarding a request.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to build request for {backend}: {source}")]
    Request {
        backend: String,
        source: axum::http::Error,
    },

    #[error("failed to get response from {backend}: {source}")]
    Upstream {
        backend: String,
        source: hyper_util::client::legacy::Error,
    },

    #[error("no response from {backend} within {timeout:?}")]
    Timeout { backend: String, timeout: Duration },
}

/// Relays requests to backends.
#[derive(Clone)]
pub struct ForwardingProxy {
    client: UpstreamClient,
    scheme: UpstreamScheme,
    timeout: Duration,
    trace: bool,
}

impl ForwardingProxy {
    pub fn new(client: UpstreamClient, scheme: UpstreamScheme, timeout: Duration, trace: bool) -> Self {
        Self {
            client,
            scheme,
            timeout,
            trace,
        }
    }

    /// Forward `request` to `backend` and return its response for streaming.
    ///
    /// `on_finish` receives the relayed status once the body stream is over,
    /// whether it completed, failed, hit the deadline or was dropped.
    pub async fn forward<F>(
        &self,
        backend: &Backend,
        request: Request<Body>,
        on_finish: F,
    ) -> Result<Response, ForwardError>
    where
        F: FnOnce(StatusCode) + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let request_error = |source: axum::http::Error| ForwardError::Request {
            backend: backend.to_string(),
            source,
        };

        let (mut parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        parts.uri = backend.uri(self.scheme, path_and_query).map_err(request_error)?;
        parts.version = Version::HTTP_11;
        let host = HeaderValue::from_str(backend.address()).map_err(|e| request_error(e.into()))?;
        parts.headers.insert(header::HOST, host);

        let outbound = Request::from_parts(parts, body);
        let response = match time::timeout_at(deadline, self.client.request(outbound)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(ForwardError::Upstream {
                    backend: backend.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ForwardError::Timeout {
                    backend: backend.to_string(),
                    timeout: self.timeout,
                })
            }
        };

        let (mut parts, body) = response.into_parts();
        if self.trace {
            if let Err(e) = set_lb_from(&mut parts.headers, backend.address()) {
                tracing::warn!(backend = %backend, error = %e, "Failed to set lb-from header");
            }
        }

        let status = parts.status;
        let address = backend.to_string();
        let body = DeadlineBody::new(body, deadline, self.timeout)
            .on_finish(move || on_finish(status))
            .map_err(move |e| {
                tracing::warn!(backend = %address, error = %e, "Failed to write response");
                e
            });

        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::client::build_client;
    use crate::http::response::LB_FROM;
    use axum::http::uri::Authority;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::routing::{any, get};
    use axum::Router;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> Backend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Backend::new(0, addr.to_string().parse::<Authority>().unwrap())
    }

    fn proxy(trace: bool) -> ForwardingProxy {
        ForwardingProxy::new(
            build_client(Duration::from_secs(1)).unwrap(),
            UpstreamScheme::Http,
            Duration::from_secs(1),
            trace,
        )
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_relays_status_headers_and_body() {
        let backend = serve(Router::new().route(
            "/teapot",
            get(|| async { (StatusCode::IM_A_TEAPOT, [("x-backend", "one")], "short and stout") }),
        ))
        .await;

        let request = Request::get("/teapot").body(Body::empty()).unwrap();
        let response = proxy(true).forward(&backend, request, |_| {}).await.unwrap();

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-backend"], "one");
        assert_eq!(response.headers()[LB_FROM], backend.address());
        assert_eq!(body_string(response).await, "short and stout");
    }

    #[tokio::test]
    async fn test_no_lb_from_without_trace() {
        let backend = serve(Router::new().route("/", get(|| async { "ok" }))).await;

        let request = Request::get("/").body(Body::empty()).unwrap();
        let response = proxy(false).forward(&backend, request, |_| {}).await.unwrap();

        assert!(response.headers().get(LB_FROM).is_none());
    }

    #[tokio::test]
    async fn test_preserves_method_query_headers_and_body() {
        let backend = serve(Router::new().route(
            "/echo",
            any(|method: axum::http::Method, uri: Uri, headers: HeaderMap, body: String| async move {
                format!(
                    "{} {} {} {} {}",
                    method,
                    uri,
                    headers["x-custom"].to_str().unwrap(),
                    headers[header::HOST].to_str().unwrap(),
                    body
                )
            }),
        ))
        .await;

        let request = Request::post("http://balancer:8090/echo?key=value")
            .header("x-custom", "kept")
            .body(Body::from("payload"))
            .unwrap();
        let response = proxy(false).forward(&backend, request, |_| {}).await.unwrap();

        assert_eq!(
            body_string(response).await,
            format!("POST /echo?key=value kept {} payload", backend.address())
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let authority: Authority = listener.local_addr().unwrap().to_string().parse().unwrap();
        drop(listener);
        let backend = Backend::new(0, authority);

        let request = Request::get("/").body(Body::empty()).unwrap();
        let err = proxy(true).forward(&backend, request, |_| {}).await.unwrap_err();
        assert!(matches!(err, ForwardError::Upstream { .. }));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let backend = serve(Router::new().route(
            "/",
            get(|| async {
                time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;

        let request = Request::get("/").body(Body::empty()).unwrap();
        let err = proxy(false).forward(&backend, request, |_| {}).await.unwrap_err();
        assert!(matches!(err, ForwardError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_finish_reports_status_after_body() {
        let backend = serve(Router::new().route("/", get(|| async { (StatusCode::CREATED, "made") }))).await;
        let finished = Arc::new(Mutex::new(None));
        let seen = finished.clone();

        let request = Request::get("/").body(Body::empty()).unwrap();
        let response = proxy(false)
            .forward(&backend, request, move |status| {
                *seen.lock().unwrap() = Some(status);
            })
            .await
            .unwrap();

        assert_eq!(*finished.lock().unwrap(), None);
        assert_eq!(body_string(response).await, "made");
        assert_eq!(*finished.lock().unwrap(), Some(StatusCode::CREATED));
    }

    #[tokio::test]
    async fn test_dripping_body_cut_at_deadline() {
        // Answers quickly, then sends one chunk every 400ms for two seconds.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let authority: Authority = listener.local_addr().unwrap().to_string().parse().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let head = "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n";
            if stream.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for _ in 0..5 {
                if stream.write_all(b"4\r\ndrip\r\n").await.is_err() {
                    return;
                }
                time::sleep(Duration::from_millis(400)).await;
            }
            let _ = stream.write_all(b"0\r\n\r\n").await;
        });
        let backend = Backend::new(0, authority);

        let started = Instant::now();
        let request = Request::get("/").body(Body::empty()).unwrap();
        let response = proxy(false).forward(&backend, request, |_| {}).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(response.into_body().collect().await.is_err());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(900), "cut too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1800), "cut too late: {elapsed:?}");
    }
}
