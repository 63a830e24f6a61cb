//! # Proxy
//!
//! The HTTP/1.1 front end: listener, request/response plumbing and the
//! per-request dispatch into the balancer.
//!
//! ## Data Flow
//!
//! ```text
//! TcpListener accept
//!     → handle_connection          (read loop, keep-alive)
//!     → Request::parse             (head + Content-Length body)
//!     → dispatch                   (select → forward → report)
//!     → Response::serialize        (written back to the client)
//! ```
//!
//! ## Design Decisions
//!
//! - All paths and methods are accepted and forwarded as-is
//! - Client reads and writes carry timeouts
//! - Failures surface to the client only as `503` with a short text body

pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use config::ProxyConfig;
pub use error::{HttpError, HttpResult};
pub use request::Request;
pub use response::Response;
pub use server::{dispatch, ProxyServer, ProxyStats};
