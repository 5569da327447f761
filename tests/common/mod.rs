//! Shared utilities for integration testing.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use sticky_balancer::config::BalancerConfig;
use sticky_balancer::http::HttpServer;
use sticky_balancer::lifecycle::Shutdown;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

/// Serve `router` on an ephemeral local port.
pub async fn start_backend(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Backend answering every path with `name`, and `/health` with 200.
pub async fn start_named_backend(name: &'static str) -> SocketAddr {
    start_backend(
        Router::new()
            .route("/health", get(|| async { "healthy" }))
            .fallback(move || async move { name }),
    )
    .await
}

/// Backend whose `/health` always fails.
#[allow(dead_code)]
pub async fn start_sick_backend(name: &'static str) -> SocketAddr {
    start_backend(
        Router::new()
            .route("/health", get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "dead") }))
            .fallback(move || async move { name }),
    )
    .await
}

/// Backend speaking raw HTTP/1.1: for each connection, reads the request head
/// and hands the stream to `respond`.
#[allow(dead_code)]
pub async fn start_raw_backend<F, Fut>(respond: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = std::sync::Arc::new(respond);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            let respond = respond.clone();
            tokio::spawn(async move {
                if read_head(&mut stream).await {
                    respond(stream).await;
                }
            });
        }
    });
    addr
}

/// Read up to the blank line ending a request head. False on early EOF.
async fn read_head(stream: &mut TcpStream) -> bool {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    true
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Balancer config for local backends.
pub fn config_for(backends: &[SocketAddr]) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.listener.bind_host = "127.0.0.1".into();
    config.listener.port = 0;
    config.backends = backends.iter().map(ToString::to_string).collect();
    config.observability.trace_header = true;
    config
}

/// A running balancer.
pub struct Balancer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub health: std::sync::Arc<sticky_balancer::health::HealthState>,
}

impl Balancer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Balancer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a balancer for `config`.
pub async fn start_balancer(config: BalancerConfig) -> Balancer {
    let server = HttpServer::new(config).unwrap();
    let health = server.health_state();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    tokio::spawn(server.run(listener, shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    Balancer {
        addr,
        shutdown,
        health,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}
