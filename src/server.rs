//! Recorder lifecycle: listener, capture worker and shutdown

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::artifact::WriterRegistry;
use crate::capture::{self, CaptureStats, CaptureWorker};
use crate::config::RecorderConfig;
use crate::proxy::RecordingProxy;
use crate::{RecorderError, Result};

/// Pause after a transient accept failure before accepting again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind the recorder and serve until `shutdown` resolves.
///
/// # Errors
///
/// See [`RecorderServer::bind`] and [`RecorderServer::run`]
pub async fn run<F>(config: RecorderConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    RecorderServer::bind(config).await?.run(shutdown).await
}

/// A bound recorder whose capture worker is already running
pub struct RecorderServer {
    config: RecorderConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    proxy: Arc<RecordingProxy>,
    stats: Arc<CaptureStats>,
    worker_stop: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl RecorderServer {
    /// Bind with the default writer registry
    ///
    /// # Errors
    ///
    /// See [`RecorderServer::bind_with_registry`]
    pub async fn bind(config: RecorderConfig) -> Result<Self> {
        Self::bind_with_registry(config, WriterRegistry::default()).await
    }

    /// Create the destination directory, start the capture worker, then bind
    /// the listener.
    ///
    /// # Errors
    ///
    /// Returns error if the destination directory cannot be created, the
    /// upstream client cannot be built, or the address cannot be bound. The
    /// worker is stopped before the error is returned.
    pub async fn bind_with_registry(
        config: RecorderConfig,
        registry: WriterRegistry,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.destination_dir).await?;

        let (handoff, inbox) = capture::channel();
        let proxy = Arc::new(RecordingProxy::new(&config, handoff)?);

        let stats = Arc::new(CaptureStats::new());
        let worker = CaptureWorker::new(
            inbox,
            registry,
            config.destination_dir.clone(),
            Arc::clone(&stats),
        );
        let (worker_stop, worker_done) = oneshot::channel();
        let worker = tokio::spawn(worker.process(worker_done));

        let addr = config.listen_addr();
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(source) => {
                error!("Failed to bind {}: {}", addr, source);
                stop_worker(worker_stop, worker).await;
                return Err(RecorderError::Bind { addr, source });
            }
        };
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config,
            listener,
            local_addr,
            proxy,
            stats,
            worker_stop,
            worker,
        })
    }

    /// Address actually bound, useful when the configured port is 0
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Capture worker counters
    #[must_use]
    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// Serve until `shutdown` resolves or the listener fails.
    ///
    /// On shutdown, new connections stop being accepted and open ones get
    /// `timeouts.shutdown_ms` to finish; the capture worker is then stopped.
    /// Exchanges still waiting in the hand-off mailbox at that point are not
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::ShutdownTimeout`] if open connections outlive
    /// the bound, or [`RecorderError::Listener`] if accepting fails.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            config,
            listener,
            local_addr,
            proxy,
            stats: _,
            worker_stop,
            worker,
        } = self;

        info!(
            "Recording on {} (proxy to {}, artifacts in {})",
            local_addr,
            config.target,
            config.destination_dir.display()
        );

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                () = &mut shutdown => break Ok(()),
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) if accept_error_is_transient(&e) => {
                            warn!("Accept failed, retrying: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                        Err(e) => break Err(e),
                    };
                    debug!("Accepted connection from {}", peer_addr);

                    let proxy = Arc::clone(&proxy);
                    let service = service_fn(move |request: Request<Incoming>| {
                        let proxy = Arc::clone(&proxy);
                        async move { Ok::<_, Infallible>(proxy.handle(request).await) }
                    });
                    let connection = http1::Builder::new()
                        .timer(TokioTimer::new())
                        .serve_connection(TokioIo::new(stream), service);
                    let connection = graceful.watch(connection);

                    tokio::spawn(async move {
                        if let Err(e) = connection.await {
                            debug!("Connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
            }
        };
        drop(listener);

        let result = match outcome {
            Ok(()) => {
                info!("Shutting down recorder");
                let bound = config.timeouts.shutdown();
                match tokio::time::timeout(bound, graceful.shutdown()).await {
                    Ok(()) => Ok(()),
                    Err(_) => {
                        error!("Open connections did not finish within {:?}", bound);
                        Err(RecorderError::ShutdownTimeout(bound))
                    }
                }
            }
            Err(e) => {
                error!("Listener failed: {}", e);
                Err(RecorderError::Listener(e))
            }
        };

        stop_worker(worker_stop, worker).await;
        info!("Shutdown complete");
        result
    }
}

/// Whether an accept error concerns a single connection or a passing
/// resource shortage rather than the listener itself
fn accept_error_is_transient(error: &io::Error) -> bool {
    match error.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted => true,
        _ => out_of_file_descriptors(error),
    }
}

/// EMFILE (24) or ENFILE (23)
#[cfg(unix)]
fn out_of_file_descriptors(error: &io::Error) -> bool {
    matches!(error.raw_os_error(), Some(23 | 24))
}

#[cfg(not(unix))]
fn out_of_file_descriptors(_error: &io::Error) -> bool {
    false
}

/// Signal the worker and wait for it; the exchange it is writing completes
async fn stop_worker(stop: oneshot::Sender<()>, worker: JoinHandle<()>) {
    let _ = stop.send(());
    if let Err(e) = worker.await {
        warn!("Capture worker ended abnormally: {}", e);
    }
}
