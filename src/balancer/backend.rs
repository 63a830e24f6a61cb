//! Backend representation and upstream transport.

use super::config::validate_address;
use super::error::{BalancerError, BalancerResult, ProbeError};
use crate::proxy::{Request, Response};
use http::StatusCode;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Health of a backend server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Health {
    /// Backend answers inside the healthy status range.
    Healthy = 0,
    /// Backend is excluded from selection.
    Unhealthy = 1,
}

impl Health {
    /// Classify an upstream status code.
    ///
    /// Statuses in `[200, 206]` inclusive count as healthy, everything else
    /// as unhealthy.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        if (200..=206).contains(&status.as_u16()) {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }

    /// Check whether this state admits traffic.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Healthy,
            _ => Self::Unhealthy,
        }
    }
}

/// A single upstream server.
///
/// The address is immutable for the lifetime of the backend. Health and the
/// last measured response time are single-word atomics so the selector can
/// read them without taking the pool lock; the HTTP client is constructed
/// once and dropped with the backend.
#[derive(Debug)]
pub struct Backend {
    /// Base URL of the upstream (scheme, host and port), no trailing slash.
    address: String,
    /// Current health, encoded as `Health`.
    health: AtomicU8,
    /// Wall time of the most recent probe or forward, in milliseconds.
    response_time_ms: AtomicU64,
    /// Client used for every request to this backend.
    client: reqwest::Client,
}

impl Backend {
    /// Create a backend for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not an absolute HTTP URL or the
    /// client cannot be built.
    pub fn new(address: &str, initial: Health) -> BalancerResult<Self> {
        validate_address(address)?;

        let client =
            reqwest::Client::builder()
                .build()
                .map_err(|e| BalancerError::Client {
                    address: address.to_string(),
                    source: e,
                })?;

        Ok(Self {
            address: address.trim_end_matches('/').to_string(),
            health: AtomicU8::new(initial as u8),
            response_time_ms: AtomicU64::new(0),
            client,
        })
    }

    /// Get the backend base URL.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Snapshot the current health.
    #[must_use]
    pub fn health(&self) -> Health {
        Health::from_u8(self.health.load(Ordering::Relaxed))
    }

    /// Snapshot the last measured response time.
    #[must_use]
    pub fn response_time(&self) -> Duration {
        Duration::from_millis(self.response_time_ms.load(Ordering::Relaxed))
    }

    /// Probe the backend's health endpoint.
    ///
    /// Measures the probe end-to-end and stores the elapsed time whatever
    /// the outcome, so a slow failing backend sorts last under
    /// least-response-time selection.
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint answers outside `[200, 206]`, the
    /// request fails in transit, or the timeout fires. Health is updated to
    /// match.
    pub async fn probe(&self, path: &str, timeout: Duration) -> Result<(), ProbeError> {
        let url = format!("{}{}", self.address, path);
        debug!(backend = %self.address, url = %url, "Probing backend");

        let start = Instant::now();
        let result = self.client.get(&url).timeout(timeout).send().await;
        self.store_response_time(start.elapsed());

        match result {
            Ok(response) => {
                let status = response.status();
                let health = Health::from_status(status);
                self.set_health(health);
                if health.is_healthy() {
                    Ok(())
                } else {
                    Err(ProbeError::Status {
                        address: self.address.clone(),
                        status,
                    })
                }
            },
            Err(e) => {
                self.set_health(Health::Unhealthy);
                Err(ProbeError::Transport {
                    address: self.address.clone(),
                    source: e,
                })
            },
        }
    }

    /// Forward a client request to this backend.
    ///
    /// Passes the upstream response through when its status is in
    /// `[200, 206]`; any other status, transport error or timeout yields a
    /// synthesized `503` instead. Transport failures never escape this
    /// method. Health and response time are updated on every outcome.
    pub async fn forward(&self, request: &Request, timeout: Duration) -> Response {
        debug!(
            backend = %self.address,
            method = %request.method(),
            path = %request.path(),
            "Forwarding request"
        );

        let start = Instant::now();
        let result = self.send_upstream(request, timeout).await;
        let elapsed = start.elapsed();
        self.store_response_time(elapsed);

        match result {
            Ok(response) => {
                let status = response.status();
                let health = Health::from_status(status);
                self.set_health(health);

                if health.is_healthy() {
                    debug!(
                        backend = %self.address,
                        status = %status,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Upstream answered"
                    );
                    response
                } else {
                    warn!(
                        backend = %self.address,
                        status = %status,
                        "Upstream answered with an error status"
                    );
                    unavailable_response()
                }
            },
            Err(e) => {
                self.set_health(Health::Unhealthy);
                warn!(backend = %self.address, error = %e, "Upstream request failed");
                unavailable_response()
            },
        }
    }

    /// Issue the request upstream and collect the full response.
    async fn send_upstream(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}{}", self.address, request.path_and_query());

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .timeout(timeout);

        for (name, value) in request.headers() {
            if !skip_when_forwarding(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        if !request.body().is_empty() {
            builder = builder.body(request.body().clone());
        }

        let upstream = builder.send().await?;
        let status = upstream.status();

        let mut response = Response::builder().status(status);
        for (name, value) in upstream.headers() {
            if let Ok(value) = value.to_str() {
                if !skip_when_forwarding(name.as_str()) && name.as_str() != "content-length" {
                    response = response.header(name.as_str(), value);
                }
            }
        }

        let body = upstream.bytes().await?;
        Ok(response.body(body).build())
    }

    fn set_health(&self, new: Health) {
        let previous = Health::from_u8(self.health.swap(new as u8, Ordering::Relaxed));
        if previous != new {
            info!(backend = %self.address, from = ?previous, to = ?new, "Backend health changed");
        }
    }

    fn store_response_time(&self, elapsed: Duration) {
        self.response_time_ms
            .store(elapsed.as_millis() as u64, Ordering::Relaxed);
    }
}

/// The synthesized reply for any upstream failure. The client cannot tell a
/// refused backend apart from an erroring one.
fn unavailable_response() -> Response {
    Response::service_unavailable()
        .text("Upstream request failed")
        .build()
}

/// Headers that must not travel between the client and the upstream.
fn skip_when_forwarding(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
    )
}
