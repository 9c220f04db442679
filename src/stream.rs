//! Ordered single-producer/single-consumer stream of scan events.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::ScanEvent;

/// Create a bounded event channel tied to `cancel`.
///
/// The producer blocks (or awaits) when the buffer is full, so slow consumers
/// apply backpressure instead of losing events.
pub fn channel(capacity: usize, cancel: CancellationToken) -> (ScanEventSender, ScanEventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ScanEventSender {
            tx,
            cancel: cancel.clone(),
        },
        ScanEventStream {
            rx,
            cancel,
            finished: false,
        },
    )
}

/// Producer half. Sends fail once the session is cancelled or the consumer is gone.
#[derive(Debug, Clone)]
pub struct ScanEventSender {
    tx: mpsc::Sender<ScanEvent>,
    cancel: CancellationToken,
}

impl ScanEventSender {
    /// Blocking send for use on a traversal worker thread.
    ///
    /// Returns `false` when the producer should stop.
    pub fn send_blocking(&self, event: ScanEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.blocking_send(event).is_ok()
    }

    pub async fn send(&self, event: ScanEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(event).await.is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Consumer half of a scan session.
///
/// Yields events in emission order and stops after the first terminal event or
/// once cancelled. Dropping the stream cancels the producer.
#[derive(Debug)]
pub struct ScanEventStream {
    rx: mpsc::Receiver<ScanEvent>,
    cancel: CancellationToken,
    finished: bool,
}

impl ScanEventStream {
    /// Receive the next event, or `None` once the stream has terminated.
    pub async fn recv(&mut self) -> Option<ScanEvent> {
        if self.finished {
            return None;
        }
        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            ev = self.rx.recv() => ev,
        };
        // Buffered events are discarded once cancellation has been observed.
        let event = event.filter(|_| !self.cancel.is_cancelled());
        match &event {
            Some(ev) if ev.is_terminal() => self.finished = true,
            Some(_) => {}
            None => self.close(),
        }
        event
    }

    /// Signal the producer to stop and release the receive buffer.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token shared with the producing session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn close(&mut self) {
        self.finished = true;
        self.rx.close();
    }
}

impl Drop for ScanEventStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
