//! HTTP server wrapping every routed request in the request interceptor.
//!
//! # Example
//!
//! ```rust,ignore
//! use microsvc::server::{service_routes, Server};
//!
//! let server = Server::bind(config.server.clone(), service_routes("service-a"), interceptor).await?;
//! server.run().await;
//! ```
//!
//! # Graceful Shutdown
//!
//! ```rust,ignore
//! // Stop accepting and ask open connections to finish their requests
//! server.trigger_shutdown();
//!
//! // Wait for connections to drain (with timeout)
//! server.wait_for_drain(Duration::from_secs(15)).await;
//! ```

mod connection;
pub mod handlers;
mod routing;

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub use connection::{ConnectionContext, METRICS_PATH};
pub use handlers::service_routes;
pub use routing::{RouteMatch, Router};

use crate::config::ServerConfig;
use crate::observability::RequestInterceptor;
use connection::{shutdown_signalled, ConnectionGuard};

/// Pause before accepting again after a failed `accept()`.
///
/// Errors like EMFILE leave the listener readable, so retrying at once spins.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bound HTTP server.
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    ctx: Arc<ConnectionContext>,
    /// Open connections, including those still finishing after shutdown
    active_connections: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    shutdown_initiated: AtomicBool,
}

impl Server {
    /// Bind the listen address. Port 0 picks a free port.
    pub async fn bind(
        config: ServerConfig,
        router: Router,
        interceptor: RequestInterceptor,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let interceptor = interceptor
            .with_request_timeout(config.request_timeout.as_duration())
            .with_access_log(config.access_log);
        let ctx = Arc::new(ConnectionContext::new(
            router,
            interceptor,
            config.max_body_size,
            config.header_read_timeout,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            listener,
            ctx,
            active_connections: Arc::new(AtomicUsize::new(0)),
            shutdown_tx,
            shutdown_rx,
            shutdown_initiated: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until shutdown is triggered.
    pub async fn run(&self) {
        match self.local_addr() {
            Ok(addr) => info!("Server listening on http://{}", addr),
            Err(e) => warn!("Server listening on unknown address: {}", e),
        }

        let shutdown = shutdown_signalled(self.shutdown_rx.clone());
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, remote_addr) = match result {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Accept error: {}", e);
                            if pause_after_accept_error(shutdown.as_mut()).await {
                                continue;
                            }
                            debug!("Shutdown signalled, stopping accept loop");
                            break;
                        }
                    };
                    let _ = stream.set_nodelay(true);

                    // Counted before spawning so a drain right after accept sees it.
                    let guard = ConnectionGuard::new(&self.active_connections);
                    let ctx = Arc::clone(&self.ctx);
                    let conn_shutdown = self.shutdown_rx.clone();

                    tokio::spawn(async move {
                        ctx.handle_connection(stream, remote_addr, conn_shutdown, guard).await;
                    });
                }
                _ = &mut shutdown => {
                    debug!("Shutdown signalled, stopping accept loop");
                    break;
                }
            }
        }
    }

    /// Trigger graceful shutdown.
    /// Stops the accept loop and lets open connections finish in-flight requests.
    pub fn trigger_shutdown(&self) {
        if self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            return; // Already initiated
        }
        let _ = self.shutdown_tx.send(true);
    }

    /// Get current active connections count.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Get the configured drain timeout.
    pub fn drain_timeout(&self) -> Duration {
        self.config.drain_timeout
    }

    /// Wait for all active connections to drain.
    /// Returns true if drained successfully, false if timeout was reached.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let start = tokio::time::Instant::now();
        let check_interval = Duration::from_millis(50);

        loop {
            let active = self.active_connections();
            if active == 0 {
                return true;
            }

            if start.elapsed() >= timeout {
                warn!("Drain timeout reached with {} active connections", active);
                return false;
            }

            debug!("Waiting for {} connections to drain...", active);
            tokio::time::sleep(check_interval).await;
        }
    }
}

/// Sleep for [`ACCEPT_ERROR_BACKOFF`]. False if `shutdown` completed first.
async fn pause_after_accept_error<F>(shutdown: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
        _ = shutdown => false,
    }
}
