//! Backend pool management and server selection.
//!
//! # Responsibilities
//! - Hold the ordered, immutable backend pool
//! - Apply the load balancing algorithm against the shared health table
//! - Report exhaustion as a distinct outcome

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::uri::Authority;
use thiserror::Error;

use crate::health::HealthState;
use crate::load_balancer::{backend::Backend, path_hash::PathHash, LoadBalancer};
use crate::observability::metrics;

/// Error building a backend pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("backend pool is empty")]
    Empty,

    #[error("invalid backend address {address:?}: {source}")]
    InvalidAddress {
        address: String,
        source: axum::http::uri::InvalidUri,
    },

    #[error("backend address {0:?} appears more than once")]
    Duplicate(String),
}

/// Selection found no healthy backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("No healthy servers available")]
    NoHealthyBackend,
}

/// Ordered backend pool, fixed at startup.
#[derive(Debug, Clone)]
pub struct BackendPool {
    backends: Vec<Backend>,
}

impl BackendPool {
    /// Build a pool from `host:port` addresses. Order is preserved.
    pub fn from_addresses<S: AsRef<str>>(addresses: &[S]) -> Result<Self, PoolError> {
        if addresses.is_empty() {
            return Err(PoolError::Empty);
        }

        let mut seen = HashSet::new();
        let mut backends = Vec::with_capacity(addresses.len());
        for (index, address) in addresses.iter().enumerate() {
            let address = address.as_ref();
            let authority: Authority = address.parse().map_err(|source| PoolError::InvalidAddress {
                address: address.to_string(),
                source,
            })?;
            // Host names are case-insensitive.
            if !seen.insert(address.to_ascii_lowercase()) {
                return Err(PoolError::Duplicate(address.to_string()));
            }
            backends.push(Backend::new(index, authority));
        }

        Ok(Self { backends })
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Backend> {
        self.backends.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }
}

/// Picks the backend for a routing key, skipping unhealthy ones.
#[derive(Debug)]
pub struct ServerSelector {
    pool: BackendPool,
    health: Arc<HealthState>,
    strategy: Box<dyn LoadBalancer>,
}

impl ServerSelector {
    /// Selector using sticky path hashing.
    pub fn new(pool: BackendPool, health: Arc<HealthState>) -> Self {
        Self::with_strategy(pool, health, Box::new(PathHash::new()))
    }

    pub fn with_strategy(
        pool: BackendPool,
        health: Arc<HealthState>,
        strategy: Box<dyn LoadBalancer>,
    ) -> Self {
        debug_assert_eq!(pool.len(), health.len());
        Self {
            pool,
            health,
            strategy,
        }
    }

    /// Select the backend for `key`.
    pub fn select(&self, key: &str) -> Result<&Backend, SelectionError> {
        let picked = self
            .health
            .snapshot_and_pick(|flags| self.strategy.next_index(key, flags));

        match picked.and_then(|index| self.pool.get(index)) {
            Some(backend) => Ok(backend),
            None => {
                tracing::debug!(
                    key = %key,
                    backend_count = self.pool.len(),
                    "No healthy backends found in pool"
                );
                metrics::record_selection_exhausted();
                Err(SelectionError::NoHealthyBackend)
            }
        }
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }
}
