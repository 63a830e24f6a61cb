//! Weir binary entry point.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use weir::balancer::{Backend, BackendPool, BalancerConfig, Health, HealthMonitor};
use weir::cli::Args;
use weir::proxy::{ProxyConfig, ProxyServer};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weir=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = args.into_config();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        },
    }
}

async fn run(config: BalancerConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let mut backends = Vec::with_capacity(config.backends.len());
    for address in &config.backends {
        backends.push(Backend::new(address, Health::Healthy)?);
    }

    let pool = Arc::new(BackendPool::new(backends, config.strategy));
    let monitor = HealthMonitor::new(Arc::clone(&pool), config.health_check.clone()).start();

    let proxy_config = ProxyConfig::default();
    let listener = TcpListener::bind(proxy_config.bind_address).await?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let server = ProxyServer::new(proxy_config, Arc::clone(&pool));
    let server_task = tokio::spawn(server.run(listener, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(()).await;
    let _ = server_task.await;
    monitor.stop().await;

    info!("Shutdown complete");
    Ok(())
}
