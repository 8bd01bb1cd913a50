//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Create the Axum Router that sends every request to the dispatcher
//! - Run the accept loop over the bound listener
//! - Terminate TLS when the runtime is in TLS mode
//! - Serve HTTP/1.1 and HTTP/2 per connection with header read, body read,
//!   write stall and idle deadlines
//! - Drain connections on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tower_http::timeout::RequestBodyTimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::http::dispatch::{proxy_handler, AppState};
use crate::http::upstream::{Forwarder, HyperForwarder};
use crate::lifecycle::runtime::Runtime;
use crate::net::connection::ConnectionId;
use crate::net::listener::ConnectionPermit;
use crate::net::{ConnectionTracker, Listener, ListenerError, TimedIo};
use crate::observability::{metrics, ServerStats};
use crate::resilience::ServerTimeouts;

/// How long shutdown waits for open connections to finish.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    runtime: Arc<Runtime>,
    router: Router,
    tracker: ConnectionTracker,
    stats: Arc<ServerStats>,
}

impl HttpServer {
    /// Create a server that forwards with the pooled hyper client.
    pub fn new(runtime: Runtime) -> Self {
        let forwarder = Arc::new(HyperForwarder::new(&runtime));
        Self::with_forwarder(runtime, forwarder)
    }

    /// Create a server with a custom forwarder.
    pub fn with_forwarder(runtime: Runtime, forwarder: Arc<dyn Forwarder>) -> Self {
        let runtime = Arc::new(runtime);
        let stats = Arc::new(ServerStats::new());
        let state = AppState {
            runtime: Arc::clone(&runtime),
            forwarder,
            stats: Arc::clone(&stats),
        };
        let router = Self::build_router(runtime.timeouts(), state);

        Self {
            runtime,
            router,
            tracker: ConnectionTracker::new(),
            stats,
        }
    }

    /// Build the Axum router with all middleware layers. Every request target,
    /// including `*` and authority-form, reaches the dispatcher.
    fn build_router(timeouts: &ServerTimeouts, state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(RequestBodyTimeoutLayer::new(timeouts.read))
            .layer(TraceLayer::new_for_http())
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Run the accept loop until shutdown is signalled, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let (drain_tx, drain_rx) = watch::channel(false);
        let connections = ConnectionContext {
            router: self.router,
            acceptor: self
                .runtime
                .tls()
                .map(|policy| TlsAcceptor::from(policy.server_config())),
            timeouts: *self.runtime.timeouts(),
            tracker: self.tracker.clone(),
            draining: drain_rx,
        };

        tracing::info!(
            address = %listener.local_addr(),
            tls = self.runtime.is_tls_mode(),
            "HTTP server starting"
        );

        loop {
            let (stream, peer, permit) = tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            tokio::spawn(connections.clone().serve(stream, peer, permit));
        }

        drop(listener);
        let _ = drain_tx.send(true);
        let remaining = self.tracker.drain(DRAIN_TIMEOUT).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Shutdown deadline passed with open connections");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Everything a spawned connection task needs.
#[derive(Clone)]
struct ConnectionContext {
    router: Router,
    acceptor: Option<TlsAcceptor>,
    timeouts: ServerTimeouts,
    tracker: ConnectionTracker,
    draining: watch::Receiver<bool>,
}

impl ConnectionContext {
    async fn serve(self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let id = guard.id();
        metrics::record_connection_opened();

        match &self.acceptor {
            Some(acceptor) => {
                match tokio::time::timeout(self.timeouts.header_read, acceptor.accept(stream)).await {
                    Ok(Ok(tls)) => self.serve_http(tls, peer, id).await,
                    Ok(Err(e)) => {
                        tracing::debug!(connection_id = %id, peer_addr = %peer, error = %e, "TLS handshake failed");
                    }
                    Err(_) => {
                        tracing::debug!(connection_id = %id, peer_addr = %peer, "TLS handshake timed out");
                    }
                }
            }
            None => self.serve_http(stream, peer, id).await,
        }

        metrics::record_connection_closed();
        drop(permit);
        drop(guard);
    }

    async fn serve_http<S>(&self, io: S, peer: SocketAddr, id: ConnectionId)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TimedIo::new(io, self.timeouts.write);
        let activity = io.activity();

        let router = self.router.clone();
        let request_activity = activity.clone();
        let service = service_fn(move |mut request: Request<Incoming>| {
            let busy = request_activity.begin_request();
            request.extensions_mut().insert(ConnectInfo(peer));
            let call = router.clone().oneshot(request);
            async move {
                let response = call.await;
                drop(busy);
                response
            }
        });

        let mut builder = auto::Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.timeouts.header_read);
        builder.http2().timer(TokioTimer::new());

        let conn = builder.serve_connection(TokioIo::new(io), service);
        tokio::pin!(conn);

        let mut draining = self.draining.clone();
        let mut idle_check = tokio::time::interval(idle_check_period(self.timeouts.idle));
        let mut closing = false;

        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(connection_id = %id, peer_addr = %peer, error = %e, "Connection ended with error");
                    }
                    break;
                }
                _ = idle_check.tick(), if !closing => {
                    if activity.idle_for() >= self.timeouts.idle {
                        tracing::debug!(connection_id = %id, peer_addr = %peer, "Closing idle connection");
                        conn.as_mut().graceful_shutdown();
                        closing = true;
                    }
                }
                _ = draining.changed(), if !closing => {
                    conn.as_mut().graceful_shutdown();
                    closing = true;
                }
            }
        }
    }
}

/// How often a connection checks whether it has gone idle.
fn idle_check_period(idle: Duration) -> Duration {
    (idle / 4).clamp(Duration::from_millis(50), Duration::from_secs(5))
}
