//! Upstream HTTP client shared by health probes and forwarding.
//!
//! # Design Decisions
//! - One pooled client for the process; connections to backends are reused
//! - The connector speaks both `http` and `https`; the configured scheme picks
//!   which one a request uses
//! - Connect attempts are bounded by the request timeout

use std::time::Duration;

use axum::body::Body;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

/// Client used for every backend call.
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Error building the upstream client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),
}

/// Build the upstream client.
pub fn build_client(connect_timeout: Duration) -> Result<UpstreamClient, ClientError> {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(connect_timeout));

    let https = HttpsConnectorBuilder::new()
        .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())?
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Ok(Client::builder(TokioExecutor::new()).build(https))
}
