//! Socket server with admission control.
//!
//! # Data Flow
//! ```text
//! run()
//!     → Listener::bind (TLS acceptor prepared when encryption is on)
//!     → loop: accept → prune finished tasks
//!         → in flight < max_connections: spawn handler task
//!         → otherwise: warn, close the socket (no response)
//!     → stop(): drain handler tasks; stop_now(): abort them
//!
//! handler task
//!     → TLS handshake (if any)
//!     → LimitedReader / LimitedWriter (limits.rs)
//!     → RequestHandler::handle_request (handler.rs)
//!     → flush, close, record last request
//!     → release() on every exit, handshake failures and aborts included
//! ```
//!
//! # Design Decisions
//! - Backpressure is hard rejection, not queueing
//! - The handshake runs in the handler task; accept never waits on a peer
//! - Only the last-request record is shared between tasks, behind a mutex

pub mod handler;
pub mod limits;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::endpoint::BoxedStream;
use crate::lifecycle::shutdown::{self, Shutdown, ShutdownMode};
use crate::net::{
    CertificateProvider, Listener, ListenerError, PemFileCertificates, SelfSignedCertificates,
    TlsError,
};
use crate::observability::metrics;

pub use handler::{HandlerError, RequestHandler, RequestInput, RequestOutput};
pub use limits::{is_limit_exceeded, LimitExceeded, LimitedReader, LimitedWriter};

/// Errors that end [`Server::run`].
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("no port configured")]
    NoPort,

    #[error("server is already running")]
    AlreadyRunning,

    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),
}

impl From<ListenerError> for ServerError {
    fn from(e: ListenerError) -> Self {
        match e {
            ListenerError::Bind(e) => ServerError::Bind(e),
            ListenerError::Accept(e) => ServerError::Accept(e),
        }
    }
}

/// Diagnostics of the most recently completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// One-line description returned by the handler.
    pub description: String,
    pub duration: Duration,
}

struct ServerInner {
    config: ServerConfig,
    handler: Arc<dyn RequestHandler>,
    certificates: RwLock<Option<Arc<dyn CertificateProvider>>>,
    running: AtomicBool,
    /// Set for the whole of `run`, including the drain after a stop.
    serving: AtomicBool,
    shutdown: Shutdown,
    bound: watch::Sender<Option<SocketAddr>>,
    last_request: Mutex<Option<RequestRecord>>,
    active: AtomicUsize,
}

/// A TCP server dispatching every accepted socket to a [`RequestHandler`].
///
/// Cloning is cheap; clones control the same server, so one clone can
/// `run()` while another calls `stop()`.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(config: ServerConfig, handler: impl RequestHandler) -> Self {
        let (bound, _) = watch::channel(None);
        Self {
            inner: Arc::new(ServerInner {
                config,
                handler: Arc::new(handler),
                certificates: RwLock::new(None),
                running: AtomicBool::new(false),
                serving: AtomicBool::new(false),
                shutdown: Shutdown::new(),
                bound,
                last_request: Mutex::new(None),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Use `provider` for the server certificate instead of the configured
    /// PEM files or a generated self-signed certificate.
    pub fn with_certificate_provider(self, provider: impl CertificateProvider + 'static) -> Self {
        *self
            .inner
            .certificates
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(provider));
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// The bound address while the listener is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.bound.borrow()
    }

    /// Wait until the listener is bound and return its address.
    ///
    /// Returns `None` when the awaited run ends without binding, e.g. because
    /// the port is taken.
    pub async fn ready(&self) -> Option<SocketAddr> {
        let mut rx = self.inner.bound.subscribe();
        if let Some(addr) = *rx.borrow_and_update() {
            return Some(addr);
        }
        // `run` publishes `None` when it ends, bound or not.
        rx.changed().await.ok()?;
        let addr = *rx.borrow();
        addr
    }

    /// Number of handler tasks currently executing.
    pub fn active_requests(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RequestRecord> {
        self.inner
            .last_request
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop accepting; in-flight requests complete before `run` returns.
    /// No-op when the server is not running.
    pub fn stop(&self) {
        if self.inner.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Server stopping");
            self.inner.shutdown.trigger(ShutdownMode::Graceful);
        }
    }

    /// Stop accepting and abort in-flight requests. Also cuts short the
    /// drain of a graceful stop. No-op when the server is not running.
    pub fn stop_now(&self) {
        let active = self.is_running() || self.inner.serving.load(Ordering::SeqCst);
        if !active || self.inner.shutdown.mode() == ShutdownMode::Immediate {
            return;
        }
        self.inner.running.store(false, Ordering::SeqCst);
        tracing::info!("Server stopping immediately");
        self.inner.shutdown.trigger(ShutdownMode::Immediate);
    }

    /// Accept and dispatch connections until stopped.
    pub async fn run(&self) -> Result<(), ServerError> {
        let port = self.inner.config.port.ok_or(ServerError::NoPort)?;
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ServerError::AlreadyRunning);
        }
        self.inner.shutdown.reset();
        self.inner.serving.store(true, Ordering::SeqCst);

        let result = self.serve(port).await;

        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.serving.store(false, Ordering::SeqCst);
        self.inner.bound.send_replace(None);
        match &result {
            Ok(()) => tracing::info!("Server stopped"),
            Err(e) => tracing::error!(error = %e, "Server failed"),
        }
        result
    }

    async fn serve(&self, port: u16) -> Result<(), ServerError> {
        let config = &self.inner.config;
        let acceptor = if config.encryption {
            Some(TlsAcceptor::from(self.tls_config()?))
        } else {
            None
        };

        let listener = Listener::bind(config, port).await?;
        self.inner.bound.send_replace(Some(listener.local_addr()));

        let mut shutdown_rx = self.inner.shutdown.subscribe();
        let mut tasks = JoinSet::new();

        while self.is_running() {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown::requested(&mut shutdown_rx) => break,
            };

            let (stream, peer_addr, id) = match accepted {
                Ok(accepted) => accepted,
                // The listener fails on purpose only when we are stopping.
                Err(_) if !self.is_running() => break,
                Err(ListenerError::Accept(e)) if is_transient(&e) => {
                    tracing::warn!(error = %e, "Transient accept failure");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            while let Some(finished) = tasks.try_join_next() {
                log_task_result(finished);
            }

            if tasks.len() >= config.max_connections {
                tracing::warn!(
                    connection_id = %id,
                    peer_addr = %peer_addr,
                    in_flight = tasks.len(),
                    max_connections = config.max_connections,
                    "Connection limit reached, rejecting"
                );
                metrics::record_rejected();
                drop(stream);
                continue;
            }

            metrics::record_accepted();
            let inner = Arc::clone(&self.inner);
            let acceptor = acceptor.clone();
            let span = tracing::debug_span!("request", connection_id = %id, peer_addr = %peer_addr);
            tasks.spawn(handle_connection(inner, stream, acceptor).instrument(span));
        }

        drop(listener);
        self.drain(tasks, shutdown_rx).await;
        Ok(())
    }

    async fn drain(&self, mut tasks: JoinSet<()>, mut shutdown_rx: watch::Receiver<ShutdownMode>) {
        if tasks.is_empty() {
            return;
        }
        if *shutdown_rx.borrow() != ShutdownMode::Immediate {
            tracing::info!(in_flight = tasks.len(), "Waiting for in-flight requests");
        }
        loop {
            if *shutdown_rx.borrow_and_update() == ShutdownMode::Immediate {
                tracing::info!(in_flight = tasks.len(), "Aborting in-flight requests");
                tasks.abort_all();
            }
            tokio::select! {
                finished = tasks.join_next() => match finished {
                    Some(result) => log_task_result(result),
                    None => break,
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        // Sender gone; finish the drain without escalation.
                        while let Some(result) = tasks.join_next().await {
                            log_task_result(result);
                        }
                        break;
                    }
                }
            }
        }
    }

    fn tls_config(&self) -> Result<Arc<rustls::ServerConfig>, TlsError> {
        let provider = self
            .inner
            .certificates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(provider) = provider {
            return provider.server_config();
        }
        match &self.inner.config.tls {
            Some(tls) => PemFileCertificates::new(&tls.cert_path, &tls.key_path).server_config(),
            None => SelfSignedCertificates::localhost()?.server_config(),
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("port", &self.inner.config.port)
            .field("running", &self.is_running())
            .field("active_requests", &self.active_requests())
            .finish()
    }
}

/// Ends a handler task: releases the handler and decrements the in-flight
/// count on every exit path, including a failed handshake or an abort.
struct ActiveGuard(Arc<ServerInner>);

impl ActiveGuard {
    fn new(inner: Arc<ServerInner>) -> Self {
        inner.active.fetch_add(1, Ordering::SeqCst);
        Self(inner)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.handler.release();
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn handle_connection(inner: Arc<ServerInner>, stream: TcpStream, acceptor: Option<TlsAcceptor>) {
    let guard = ActiveGuard::new(inner);
    let inner = &guard.0;

    let stream: BoxedStream = match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls) => Box::new(tls),
            Err(e) => {
                tracing::warn!(error = %e, "TLS handshake failed");
                return;
            }
        },
        None => Box::new(stream),
    };

    let (read, write) = tokio::io::split(stream);
    let mut input = BufReader::new(LimitedReader::new(read, inner.config.max_request_size));
    let mut output = BufWriter::new(LimitedWriter::new(write, inner.config.max_response_size));

    let started = Instant::now();
    let result = inner.handler.handle_request(&mut input, &mut output).await;
    let closed = async {
        output.flush().await?;
        output.shutdown().await
    }
    .await;
    let duration = started.elapsed();
    metrics::record_request(duration);

    match result {
        Ok(description) => {
            let description = single_line(&description);
            tracing::debug!(
                request = %description,
                elapsed_ms = duration.as_millis() as u64,
                "Request handled"
            );
            *inner
                .last_request
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(RequestRecord {
                description,
                duration,
            });
        }
        Err(e) => tracing::error!(error = %e, "Request handler failed"),
    }
    if let Err(e) = closed {
        tracing::debug!(error = %e, "Failed to flush response");
    }
}

fn single_line(description: &str) -> String {
    description.split(['\r', '\n']).filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ")
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
    )
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "Request handler panicked");
        }
    }
}
