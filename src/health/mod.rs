//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     schedule.rs timer (one per backend)
//!     → Probe GET /health
//!     → Write state.rs
//!
//! Selection (load_balancer):
//!     → Reads state.rs under the same lock
//! ```
//!
//! # Design Decisions
//! - Health is a plain boolean per backend, no hysteresis
//! - Each backend has its own task; one slow probe never delays another
//! - Probes run outside the table lock; only the write takes it

pub mod active;
pub mod schedule;
pub mod state;

pub use active::{spawn_health_checkers, HealthChecker};
pub use schedule::Schedule;
pub use state::HealthState;
