//! Command line interface.

use crate::balancer::{BalancerConfig, HealthCheckConfig, StrategyKind};
use clap::Parser;
use std::time::Duration;

/// Load balancer listening on port 8080 and forwarding requests to a list
/// of backend servers.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
    /// Backend base URLs (scheme, host and port)
    #[arg(short = 'b', long = "backends", num_args = 1.., required = true)]
    pub backends: Vec<String>,

    /// Time interval in seconds between health checks
    #[arg(short = 'c', long = "health-check", default_value_t = 10)]
    pub health_check: u64,

    /// Select the backend with the lowest measured response time instead of
    /// round robin
    #[arg(short = 'd', long = "dynamic-algo")]
    pub dynamic_algo: bool,
}

impl Args {
    /// Turn the parsed arguments into a balancer configuration.
    #[must_use]
    pub fn into_config(self) -> BalancerConfig {
        BalancerConfig {
            backends: self.backends,
            strategy: if self.dynamic_algo {
                StrategyKind::LeastResponseTime
            } else {
                StrategyKind::RoundRobin
            },
            health_check: HealthCheckConfig {
                interval: Duration::from_secs(self.health_check),
                ..HealthCheckConfig::default()
            },
        }
    }
}
