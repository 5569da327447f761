//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request path (routing key)
//!     → pool.rs (lock health table)
//!     → Apply load balancing algorithm:
//!         - path_hash.rs (hash key, ring-probe to next healthy index)
//!     → backend.rs (resolve index to backend)
//!     → Return backend or NoHealthyBackend
//! ```
//!
//! # Design Decisions
//! - The pool is fixed at startup; index order is part of routing
//! - Algorithms are pure functions of (key, health table)
//! - The decision runs while the health table lock is held
//! - Unhealthy backends excluded from selection

pub mod backend;
pub mod path_hash;
pub mod pool;

pub use backend::Backend;
pub use path_hash::PathHash;
pub use pool::{BackendPool, PoolError, SelectionError, ServerSelector};

/// Strategy picking a backend index for a routing key.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Index of the backend that should serve `key`, given the health of every
    /// backend in pool order. `None` when no backend can serve it.
    fn next_index(&self, key: &str, health: &[bool]) -> Option<usize>;
}
