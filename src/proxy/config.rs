//! Proxy front-end configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the listening side of the proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the proxy listens on.
    pub bind_address: SocketAddr,

    /// Timeout for reading a request from the client.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,

    /// Timeout for writing a response to the client.
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,

    /// Timeout for one forwarded upstream request.
    #[serde(with = "humantime_serde")]
    pub forward_timeout: Duration,

    /// Maximum accepted request size, header block and body together.
    pub max_request_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            forward_timeout: Duration::from_secs(30),
            max_request_size: 1024 * 1024,
        }
    }
}
