//! Capture worker: turns exchanges into artifacts off the request path

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactWriter, WriterRegistry};
use crate::exchange::CapturedExchange;
use crate::Result;

use super::handoff::Inbox;
use super::stats::CaptureStats;

/// Single consumer of the hand-off mailbox
pub struct CaptureWorker {
    inbox: Inbox,
    registry: WriterRegistry,
    destination_dir: PathBuf,
    stats: Arc<CaptureStats>,
}

impl CaptureWorker {
    /// Create a worker writing into `destination_dir`
    #[must_use]
    pub fn new(
        inbox: Inbox,
        registry: WriterRegistry,
        destination_dir: PathBuf,
        stats: Arc<CaptureStats>,
    ) -> Self {
        Self {
            inbox,
            registry,
            destination_dir,
            stats,
        }
    }

    /// Run until `done` fires (or its sender is dropped) or every
    /// [`super::HandOff`] is gone.
    ///
    /// An exchange already received is written to completion before `done` is
    /// looked at again. Exchanges still parked in the mailbox when `done`
    /// fires are dropped, and their senders get an error.
    pub async fn process(mut self, mut done: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = &mut done => {
                    info!("Capture worker shutting down");
                    return;
                }
                received = self.inbox.recv() => {
                    let Some(exchange) = received else {
                        info!("All capture senders closed, worker exiting");
                        return;
                    };
                    self.persist(exchange).await;
                }
            }
        }
    }

    /// Write one exchange; failures are logged and counted, never returned
    async fn persist(&self, exchange: CapturedExchange) {
        self.stats.record_received();

        let Some(writer) = self.registry.resolve(
            exchange.content_type(),
            &self.destination_dir,
            &exchange.path,
        ) else {
            debug!(
                "No artifact writer for {} {} (content type {:?}), skipping",
                exchange.method,
                exchange.path,
                exchange.content_type()
            );
            self.stats.record_skipped();
            return;
        };

        let destination = writer.destination().to_path_buf();
        self.stats.begin_write();
        let outcome = tokio::task::spawn_blocking(move || write_and_close(writer, &exchange)).await;

        let succeeded = match outcome {
            Ok(Ok(())) => {
                debug!("Recorded artifact {}", destination.display());
                true
            }
            Ok(Err(e)) => {
                warn!("Dropping artifact {}: {}", destination.display(), e);
                false
            }
            Err(e) => {
                warn!("Artifact task for {} failed: {}", destination.display(), e);
                false
            }
        };
        self.stats.end_write(succeeded);
    }
}

/// Write then close, closing even when the write failed
fn write_and_close(mut writer: Box<dyn ArtifactWriter>, exchange: &CapturedExchange) -> Result<()> {
    let written = writer.write(exchange);
    let closed = writer.close();
    written.and(closed)
}
