//! Balancer configuration types.

use super::error::{BalancerError, BalancerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Configuration for the backend pool and its health monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Backend base URLs (scheme, host and port).
    pub backends: Vec<String>,

    /// Selection strategy for the healthy partition.
    pub strategy: StrategyKind,

    /// Health check settings.
    pub health_check: HealthCheckConfig,
}

impl BalancerConfig {
    /// Validate the configuration before the pool is built.
    ///
    /// # Errors
    ///
    /// Returns an error if no backends are configured or an address is not
    /// an absolute `http`/`https` URL.
    pub fn validate(&self) -> BalancerResult<()> {
        if self.backends.is_empty() {
            return Err(BalancerError::NoBackendsConfigured);
        }

        for address in &self.backends {
            validate_address(address)?;
        }

        Ok(())
    }
}

/// Check that a backend address is an absolute HTTP URL with a host.
pub fn validate_address(address: &str) -> BalancerResult<()> {
    let url = Url::parse(address).map_err(|e| BalancerError::InvalidBackendAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(BalancerError::InvalidBackendAddress {
            address: address.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if url.host_str().is_none() {
        return Err(BalancerError::InvalidBackendAddress {
            address: address.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(())
}

/// Selection strategy types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Rotate through healthy backends in order.
    #[default]
    RoundRobin,
    /// Pick the healthy backend with the lowest measured response time.
    LeastResponseTime,
}

/// Health check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Time between health check cycles.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Timeout for a single probe.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Path probed on every backend.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(5),
            path: "/health".to_string(),
        }
    }
}
