//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server
//! - Keep the backend's position in the pool (its hash index)
//! - Build URIs against the backend for probes and forwarded requests

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;

use crate::config::UpstreamScheme;

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    index: usize,
    authority: Authority,
}

impl Backend {
    /// Create a backend at position `index` of the pool.
    pub fn new(index: usize, authority: Authority) -> Self {
        Self { index, authority }
    }

    /// Position in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// `host:port` as configured.
    pub fn address(&self) -> &str {
        self.authority.as_str()
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Absolute URI for `path_and_query` on this backend.
    pub fn uri(
        &self,
        scheme: UpstreamScheme,
        path_and_query: PathAndQuery,
    ) -> Result<Uri, axum::http::Error> {
        let scheme = match scheme {
            UpstreamScheme::Http => Scheme::HTTP,
            UpstreamScheme::Https => Scheme::HTTPS,
        };
        Uri::builder()
            .scheme(scheme)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.address())
    }
}
