//! Depth-0 mailbox between request handlers and the capture worker

use tokio::sync::{mpsc, oneshot};

use crate::exchange::CapturedExchange;
use crate::{RecorderError, Result};

/// An exchange plus the receipt the worker signs when it takes it
struct Parcel {
    exchange: CapturedExchange,
    receipt: oneshot::Sender<()>,
}

/// Create a connected sender/inbox pair.
///
/// [`HandOff::hand_off`] only completes once the worker has pulled the
/// exchange out of the mailbox, so a handler never gets ahead of the worker by
/// more than the exchange it is waiting on.
#[must_use]
pub fn channel() -> (HandOff, Inbox) {
    let (tx, rx) = mpsc::channel(1);
    (HandOff { tx }, Inbox { rx })
}

/// Producer side, cloned into every request handler
#[derive(Clone)]
pub struct HandOff {
    tx: mpsc::Sender<Parcel>,
}

impl HandOff {
    /// Give `exchange` to the worker, waiting until it has been received.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::HandOff`] if the worker is gone, or if it shut
    /// down while the exchange was still waiting in the mailbox. In both cases
    /// the exchange is dropped.
    pub async fn hand_off(&self, exchange: CapturedExchange) -> Result<()> {
        let (receipt, received) = oneshot::channel();

        self.tx
            .send(Parcel { exchange, receipt })
            .await
            .map_err(|_| RecorderError::HandOff("capture worker is not running"))?;

        received
            .await
            .map_err(|_| RecorderError::HandOff("capture worker stopped before receiving"))
    }
}

/// Consumer side, owned by the single capture worker
pub struct Inbox {
    rx: mpsc::Receiver<Parcel>,
}

impl Inbox {
    /// Receive the next exchange and release its sender.
    ///
    /// Cancel safe: if the future is dropped before completing, no exchange is
    /// taken out of the mailbox.
    pub async fn recv(&mut self) -> Option<CapturedExchange> {
        let Parcel { exchange, receipt } = self.rx.recv().await?;
        // The handler may have been cancelled meanwhile; the exchange is still ours.
        let _ = receipt.send(());
        Some(exchange)
    }
}
