//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Start health checkers → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Latch stop flag → Stop accepting, stop checkers → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then checkers, then listener
//! - No drain of in-flight requests is promised; shutdown has a deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_termination;
