//! # Balancer
//!
//! Backend pool, selection strategies and the health monitor.
//!
//! ## Data Flow
//!
//! ```text
//! client request
//!     → pool.acquire_selection()        (healthy partition, per strategy)
//!     → backend.forward(request)        (upstream I/O, no lock held)
//!     → pool.report_outcome(ticket, _)  (reinsert or demote)
//!
//! in parallel:
//! health monitor
//!     → backend.probe()                 (GET /health, per backend)
//!     → pool.reclassify(slot, health)   (partition move)
//! ```
//!
//! ## Design Decisions
//!
//! - One mutex guards partition membership and strategy state; it is never
//!   held across network I/O
//! - Per-backend health and response time are atomics, readable lock-free
//! - Least-response-time pops the selected slot so overlapping requests
//!   spread across backends; round robin leaves it in place
//! - A selection ticket is consumed by value, so each outcome is reported
//!   exactly once

pub mod backend;
pub mod config;
pub mod error;
pub mod health;
pub mod pool;
mod strategy;

pub use backend::{Backend, Health};
pub use config::{BalancerConfig, HealthCheckConfig, StrategyKind};
pub use error::{BalancerError, BalancerResult, ProbeError};
pub use health::{HealthMonitor, MonitorHandle};
pub use pool::{BackendPool, Outcome, SelectionTicket};
