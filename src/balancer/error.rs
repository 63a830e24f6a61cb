//! Balancer error types.

use http::StatusCode;
use thiserror::Error;

/// Errors that can occur while configuring or driving the backend pool.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// Every configured backend is currently excluded from selection.
    #[error("no healthy backends available")]
    NoHealthyBackends,

    /// The backend list was empty at startup.
    #[error("no backend addresses configured")]
    NoBackendsConfigured,

    /// A backend address did not parse as an absolute HTTP URL.
    #[error("invalid backend address '{address}': {reason}")]
    InvalidBackendAddress {
        /// The offending address as given on the command line.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The HTTP client for a backend could not be constructed.
    #[error("failed to build HTTP client for '{address}': {source}")]
    Client {
        /// Backend address the client was meant for.
        address: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
}

/// Result type for balancer operations.
pub type BalancerResult<T> = Result<T, BalancerError>;

/// Outcome of a single health probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The health endpoint answered outside the healthy status range.
    #[error("backend {address} answered status {status}")]
    Status {
        /// Backend address that was probed.
        address: String,
        /// The status it answered with.
        status: StatusCode,
    },

    /// The probe request failed in transit or timed out.
    #[error("probe of {address} failed: {source}")]
    Transport {
        /// Backend address that was probed.
        address: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
}
