//! Proxy listener and per-request dispatch.

use super::config::ProxyConfig;
use super::error::{HttpError, HttpResult};
use super::request::Request;
use super::response::Response;
use crate::balancer::{BackendPool, Health, Outcome};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Counters for the proxy front end.
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Total requests received.
    pub requests_total: AtomicU64,
    /// Responses in the 2xx class.
    pub responses_2xx: AtomicU64,
    /// Responses in the 4xx class.
    pub responses_4xx: AtomicU64,
    /// Responses in the 5xx class.
    pub responses_5xx: AtomicU64,
    /// Requests rejected because no backend was healthy.
    pub rejected_no_backend: AtomicU64,
    /// Forwards that came back as failures.
    pub upstream_failures: AtomicU64,
    /// Currently open client connections.
    pub active_connections: AtomicU64,
}

impl ProxyStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request.
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response by status code.
    pub fn record_response(&self, status: u16) {
        match status {
            200..=299 => self.responses_2xx.fetch_add(1, Ordering::Relaxed),
            400..=499 => self.responses_4xx.fetch_add(1, Ordering::Relaxed),
            500..=599 => self.responses_5xx.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    /// Record an empty-pool rejection.
    pub fn record_rejected(&self) {
        self.rejected_no_backend.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed forward.
    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment active connections.
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connections.
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Handle one client request end to end.
///
/// Selects a backend, forwards the request, reports the outcome back to the
/// pool and returns the response to write to the client. An empty pool
/// yields `503` without touching pool state; a failed forward demotes the
/// chosen backend. There is no retry on a second backend.
pub async fn dispatch(
    pool: &BackendPool,
    request: &Request,
    config: &ProxyConfig,
    stats: &ProxyStats,
) -> Response {
    let ticket = match pool.acquire_selection() {
        Ok(ticket) => ticket,
        Err(e) => {
            warn!(error = %e, "Rejecting request");
            stats.record_rejected();
            return Response::service_unavailable()
                .text("No healthy backends available")
                .build();
        },
    };

    debug!(backend = %ticket.backend().address(), "Selected backend");
    let response = ticket
        .backend()
        .forward(request, config.forward_timeout)
        .await;

    let outcome = if Health::from_status(response.status()).is_healthy() {
        Outcome::Ok
    } else {
        stats.record_upstream_failure();
        Outcome::Failure
    };
    pool.report_outcome(ticket, outcome);

    response
}

/// The listening side of the proxy.
#[derive(Debug)]
pub struct ProxyServer {
    config: ProxyConfig,
    pool: Arc<BackendPool>,
    stats: Arc<ProxyStats>,
}

impl ProxyServer {
    /// Create a server over the given pool.
    #[must_use]
    pub fn new(config: ProxyConfig, pool: Arc<BackendPool>) -> Self {
        Self {
            config,
            pool,
            stats: Arc::new(ProxyStats::new()),
        }
    }

    /// Get the server statistics.
    #[must_use]
    pub fn stats(&self) -> Arc<ProxyStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections until a shutdown signal arrives.
    pub async fn run(self, listener: TcpListener, mut shutdown: mpsc::Receiver<()>) {
        if let Ok(addr) = listener.local_addr() {
            info!(address = %addr, "Proxy listener started");
        }

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!(peer = %peer, "New connection");

                            let pool = Arc::clone(&self.pool);
                            let config = self.config.clone();
                            let stats = Arc::clone(&self.stats);

                            tokio::spawn(async move {
                                Self::handle_connection(stream, pool, config, stats).await;
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "Accept error");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Proxy listener shutting down");
                    break;
                }
            }
        }
    }

    /// Serve requests on one client connection until it closes.
    async fn handle_connection(
        mut stream: TcpStream,
        pool: Arc<BackendPool>,
        config: ProxyConfig,
        stats: Arc<ProxyStats>,
    ) {
        stats.connection_opened();
        let peer_addr = stream.peer_addr().ok().map(|a| a.to_string());

        loop {
            let mut request = match Self::read_request(&mut stream, &config).await {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("Connection closed by client");
                    break;
                },
                Err(HttpError::Io(_) | HttpError::ConnectionClosed) => break,
                Err(HttpError::Timeout(_)) => {
                    debug!("Read timeout");
                    break;
                },
                Err(e) => {
                    warn!(error = %e, "Failed to read request");
                    let response = Response::bad_request()
                        .text(format!("Bad Request: {e}"))
                        .build();
                    let _ = stream.write_all(&response.serialize()).await;
                    break;
                },
            };

            stats.record_request();

            if let Some(ref addr) = peer_addr {
                request.set_header("x-forwarded-for", addr);
            }

            info!(
                peer = peer_addr.as_deref().unwrap_or("unknown"),
                method = %request.method(),
                path = %request.path(),
                version = ?request.version(),
                "Received request"
            );

            let response = dispatch(&pool, &request, &config, &stats).await;
            stats.record_response(response.status().as_u16());

            let write = timeout(
                config.write_timeout,
                stream.write_all(&response.serialize()),
            )
            .await;
            match write {
                Ok(Ok(())) => {},
                Ok(Err(e)) => {
                    debug!(error = %e, "Write error");
                    break;
                },
                Err(_) => {
                    debug!("Write timeout");
                    break;
                },
            }

            if !request.is_keep_alive() {
                break;
            }
        }

        stats.connection_closed();
    }

    /// Read one full request, head and Content-Length body.
    ///
    /// Returns `Ok(None)` when the client closed the connection cleanly
    /// before sending anything.
    async fn read_request(
        stream: &mut TcpStream,
        config: &ProxyConfig,
    ) -> HttpResult<Option<Request>> {
        let mut buf = BytesMut::with_capacity(8192);
        let mut chunk = [0u8; 8192];

        loop {
            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let (mut request, body_offset) = Request::parse(&buf)?;
                let body_len = request.content_length().unwrap_or(0);

                if buf.len() >= body_offset + body_len {
                    if body_len > 0 {
                        request.set_body(Bytes::copy_from_slice(
                            &buf[body_offset..body_offset + body_len],
                        ));
                    }
                    return Ok(Some(request));
                }
            }

            if buf.len() > config.max_request_size {
                return Err(HttpError::RequestTooLarge {
                    size: buf.len(),
                    max: config.max_request_size,
                });
            }

            let n = timeout(config.read_timeout, stream.read(&mut chunk))
                .await
                .map_err(|_| HttpError::Timeout("reading request".to_string()))??;

            if n == 0 {
                return if buf.is_empty() {
                    Ok(None)
                } else {
                    Err(HttpError::ConnectionClosed)
                };
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balancer::{Backend, StrategyKind};
    use http::{Method, StatusCode};
    use std::net::SocketAddr;
    use std::time::Duration;

    async fn spawn_stub(status: u16, body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let mut data = Vec::new();
                    loop {
                        let Ok(n) = stream.read(&mut buf).await else {
                            return;
                        };
                        if n == 0 {
                            return;
                        }
                        data.extend_from_slice(&buf[..n]);
                        if data.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let response = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });

        addr
    }

    fn test_config() -> ProxyConfig {
        ProxyConfig {
            forward_timeout: Duration::from_secs(1),
            ..ProxyConfig::default()
        }
    }

    fn get_request(path: &str) -> Request {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_stats_record_response_classes() {
        let stats = ProxyStats::new();
        stats.record_response(200);
        stats.record_response(204);
        stats.record_response(404);
        stats.record_response(503);

        assert_eq!(stats.responses_2xx.load(Ordering::Relaxed), 2);
        assert_eq!(stats.responses_4xx.load(Ordering::Relaxed), 1);
        assert_eq!(stats.responses_5xx.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_dispatch_empty_pool() {
        let pool = BackendPool::new(Vec::new(), StrategyKind::RoundRobin);
        let stats = ProxyStats::new();

        let response = dispatch(&pool, &get_request("/"), &test_config(), &stats).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&response.body()[..], b"No healthy backends available");
        assert_eq!(stats.rejected_no_backend.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_dispatch_passes_upstream_response_through() {
        let addr = spawn_stub(200, "upstream says hi").await;
        let pool = BackendPool::new(
            vec![Backend::new(&format!("http://{addr}"), Health::Healthy).unwrap()],
            StrategyKind::RoundRobin,
        );
        let stats = ProxyStats::new();

        let response = dispatch(&pool, &get_request("/hello"), &test_config(), &stats).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body()[..], b"upstream says hi");
        assert_eq!(pool.healthy_count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_demotes_failing_backend() {
        let addr = spawn_stub(500, "boom").await;
        let pool = BackendPool::new(
            vec![Backend::new(&format!("http://{addr}"), Health::Healthy).unwrap()],
            StrategyKind::RoundRobin,
        );
        let stats = ProxyStats::new();

        let response = dispatch(&pool, &get_request("/"), &test_config(), &stats).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(pool.healthy_count(), 0);
        assert_eq!(stats.upstream_failures.load(Ordering::Relaxed), 1);

        // The next request hits the empty pool.
        let response = dispatch(&pool, &get_request("/"), &test_config(), &stats).await;
        assert_eq!(&response.body()[..], b"No healthy backends available");
    }
}
