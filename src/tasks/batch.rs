//! Coalesces per-item discovery events into batches before they reach the sequencer.

use std::path::PathBuf;
use std::time::Duration;

use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::events::ScanEvent;
use crate::stream::ScanEventStream;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Flush as soon as this many items are buffered.
    pub max_items: usize,
    /// Flush once no new item has arrived for this long.
    pub debounce: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_items: 100,
            debounce: Duration::from_millis(50),
        }
    }
}

/// Buffering state of the aggregator, independent of any timer.
///
/// Rules:
/// - The very first discovered item is forwarded on its own right away.
/// - Later items are held until `max_items` accumulate or the debounce window closes.
/// - Progress and terminal events flush the buffer before being forwarded.
#[derive(Debug)]
pub struct BatchAggregator {
    options: BatchOptions,
    pending: Vec<PathBuf>,
    total_found: usize,
    delivered_any: bool,
}

impl BatchAggregator {
    pub fn new(options: BatchOptions) -> Self {
        Self {
            options: BatchOptions {
                max_items: options.max_items.max(1),
                ..options
            },
            pending: Vec::new(),
            total_found: 0,
            delivered_any: false,
        }
    }

    /// Accept one upstream event and return whatever must be forwarded now, in order.
    pub fn push(&mut self, event: ScanEvent) -> Vec<ScanEvent> {
        match event {
            ScanEvent::ItemFound { path, total_found } => {
                self.total_found = total_found;
                self.pending.push(path);
                self.flush_if_due().into_iter().collect()
            }
            ScanEvent::ItemBatch { paths, total_found } => {
                self.total_found = total_found;
                self.pending.extend(paths);
                self.flush_if_due().into_iter().collect()
            }
            other => {
                let mut out = Vec::with_capacity(2);
                out.extend(self.flush());
                out.push(other);
                out
            }
        }
    }

    /// Drain the buffer into a single batch event.
    pub fn flush(&mut self) -> Option<ScanEvent> {
        if self.pending.is_empty() {
            return None;
        }
        self.delivered_any = true;
        let paths = std::mem::take(&mut self.pending);
        trace!(size = paths.len(), total = self.total_found, "flushing batch");
        Some(ScanEvent::ItemBatch {
            paths,
            total_found: self.total_found,
        })
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn debounce(&self) -> Duration {
        self.options.debounce
    }

    fn flush_if_due(&mut self) -> Option<ScanEvent> {
        if !self.delivered_any || self.pending.len() >= self.options.max_items {
            self.flush()
        } else {
            None
        }
    }
}

/// Drive a [`BatchAggregator`] between a scan stream and `output`.
///
/// Cancelling `cancel` stops the upstream scan, drops the debounce timer and
/// forwards whatever was already buffered.
#[instrument(skip_all)]
pub async fn run(
    mut input: ScanEventStream,
    output: Sender<ScanEvent>,
    options: BatchOptions,
    cancel: CancellationToken,
) {
    let mut aggregator = BatchAggregator::new(options);
    let debounce = aggregator.debounce();
    let flush_timer = sleep(debounce);
    tokio::pin!(flush_timer);

    loop {
        select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("aggregator cancelled");
                input.cancel();
                break;
            }

            _ = &mut flush_timer, if aggregator.has_pending() => {
                if let Some(batch) = aggregator.flush() {
                    if output.send(batch).await.is_err() {
                        input.cancel();
                        return;
                    }
                }
            }

            maybe_ev = input.recv() => match maybe_ev {
                Some(ev) => {
                    let terminal = ev.is_terminal();
                    for out in aggregator.push(ev) {
                        if output.send(out).await.is_err() {
                            debug!("sequencer dropped its receiver; stopping aggregator");
                            input.cancel();
                            return;
                        }
                    }
                    if terminal {
                        return;
                    }
                    if aggregator.has_pending() {
                        flush_timer.as_mut().reset(Instant::now() + debounce);
                    }
                }
                None => {
                    // Upstream ended without a terminal event (cancelled).
                    break;
                }
            }
        }
    }

    if let Some(batch) = aggregator.flush() {
        let _ = output.send(batch).await;
    }
}
