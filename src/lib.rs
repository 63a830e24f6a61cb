//! # Weir
//!
//! An HTTP reverse proxy that balances traffic across a pool of
//! health-checked backend servers.
//!
//! ## Features
//!
//! - Round-robin and least-response-time backend selection
//! - Background health monitor probing `GET /health` on every backend
//! - Automatic demotion of failing backends and promotion on recovery
//! - HTTP/1.1 front end with keep-alive, all methods and paths forwarded
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │        proxy         │
//! │                      │       ┌──────────┐
//! │  ┌────────────────┐  │─────▶│ Backend1 │
//! │  │   dispatch     │  │       └──────────┘
//! │  └───────┬────────┘  │       ┌──────────┐
//! │          ▼           │─────▶│ Backend2 │
//! │  ┌────────────────┐  │       └──────────┘
//! │  │ balancer pool  │  │       ┌──────────┐
//! │  │ + health check │  │─────▶│ Backend3 │
//! │  └────────────────┘  │       └──────────┘
//! └──────────────────────┘
//! ```
//!
//! The pool partitions backends into a healthy set the selector draws from
//! and an unhealthy set excluded from selection; the dispatcher and the
//! health monitor both move backends between the two.

pub mod balancer;
pub mod cli;
pub mod proxy;
