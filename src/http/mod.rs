//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, catch-all handler)
//!     → [load balancer picks backend by path]
//!     → forward.rs (rewrite onto backend, send via client.rs)
//!     → deadline.rs (cut the streamed body at the request deadline)
//!     → response.rs (lb-from header, 503 on failure)
//!     → Stream to client
//! ```

pub mod client;
pub mod deadline;
pub mod forward;
pub mod response;
pub mod server;

pub use client::{build_client, UpstreamClient};
pub use forward::{ForwardError, ForwardingProxy};
pub use response::LB_FROM;
pub use server::{HttpServer, ServerError};
