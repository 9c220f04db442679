//! Single owner of [`PlaybackState`]: scan ingestion, user commands and the advance timer.

use std::path::PathBuf;
use std::time::Duration;

use config_model::{PlaybackOrder, SlideshowSettings};
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::SequencerClosed;
use crate::events::{ScanEvent, SequencerCommand};
use crate::playback::{DEFAULT_HISTORY_LIMIT, PlaybackSnapshot, PlaybackState};
use crate::tasks::batch::{self, BatchOptions};
use crate::tasks::scanner::{ScanOptions, TreeScanner};

/// Read-only access to the settings the sequencer samples at runtime.
pub trait SettingsSource: Send + Sync + 'static {
    /// Order applied when a stream starts and whenever the advance timer is armed.
    fn order(&self) -> PlaybackOrder;
    /// Interval used the next time the advance timer is armed.
    fn slide_interval(&self) -> Duration;
}

impl SettingsSource for SlideshowSettings {
    fn order(&self) -> PlaybackOrder {
        self.order
    }

    fn slide_interval(&self) -> Duration {
        self.slide_interval
    }
}

impl SettingsSource for watch::Receiver<SlideshowSettings> {
    fn order(&self) -> PlaybackOrder {
        self.borrow().order
    }

    fn slide_interval(&self) -> Duration {
        self.borrow().slide_interval
    }
}

#[derive(Debug, Clone)]
pub struct SequencerOptions {
    pub scan: ScanOptions,
    pub batch: BatchOptions,
    pub history_limit: usize,
    pub shuffle_seed: Option<u64>,
}

impl Default for SequencerOptions {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            batch: BatchOptions::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            shuffle_seed: None,
        }
    }
}

/// Client side of a running sequencer.
///
/// Commands are queued to the task in call order; state is observed through snapshots.
#[derive(Debug, Clone)]
pub struct SequencerHandle {
    commands: mpsc::Sender<SequencerCommand>,
    snapshots: watch::Receiver<PlaybackSnapshot>,
    cancel: CancellationToken,
}

impl SequencerHandle {
    /// Spawn a sequencer task on the current runtime.
    pub fn spawn<S: SettingsSource>(
        settings: S,
        options: SequencerOptions,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (snap_tx, snap_rx) = watch::channel(PlaybackSnapshot::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(cmd_rx, snap_tx, settings, options, cancel.clone()));
        let handle = Self {
            commands: cmd_tx,
            snapshots: snap_rx,
            cancel,
        };
        (handle, task)
    }

    pub async fn start(
        &self,
        root: impl Into<PathBuf>,
        recursive: bool,
    ) -> Result<(), SequencerClosed> {
        self.send(SequencerCommand::Start {
            root: root.into(),
            recursive,
        })
        .await
    }

    pub async fn next_image(&self) -> Result<(), SequencerClosed> {
        self.send(SequencerCommand::Next).await
    }

    pub async fn previous_image(&self) -> Result<(), SequencerClosed> {
        self.send(SequencerCommand::Previous).await
    }

    pub async fn goto_index(&self, index: usize) -> Result<(), SequencerClosed> {
        self.send(SequencerCommand::GotoIndex(index)).await
    }

    pub async fn toggle_play_pause(&self) -> Result<(), SequencerClosed> {
        self.send(SequencerCommand::TogglePlayPause).await
    }

    pub async fn set_playing(&self, playing: bool) -> Result<(), SequencerClosed> {
        self.send(SequencerCommand::SetPlaying(playing)).await
    }

    pub async fn set_order(&self, order: PlaybackOrder) -> Result<(), SequencerClosed> {
        self.send(SequencerCommand::SetOrder(order)).await
    }

    /// Stop the running scan but keep everything discovered so far.
    pub async fn cancel_scan(&self) -> Result<(), SequencerClosed> {
        self.send(SequencerCommand::CancelScan).await
    }

    /// Stop the task, its scan and its timer.
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.clone()
    }

    async fn send(&self, command: SequencerCommand) -> Result<(), SequencerClosed> {
        self.commands.send(command).await.map_err(|_| SequencerClosed)
    }
}

struct ActiveSession {
    events: mpsc::Receiver<ScanEvent>,
    cancel: CancellationToken,
}

/// Sequencer event loop.
///
/// Rules:
/// - Every mutation of the playback state happens on this task.
/// - Starting a stream supersedes the previous one; its undelivered events are dropped.
/// - The advance timer runs only while playing with a non-empty collection, and
///   samples the slide interval and order mode each time it is armed.
/// - A snapshot is published after every change.
#[instrument(skip_all)]
pub async fn run<S: SettingsSource>(
    mut commands: mpsc::Receiver<SequencerCommand>,
    snapshots: watch::Sender<PlaybackSnapshot>,
    settings: S,
    options: SequencerOptions,
    cancel: CancellationToken,
) {
    let mut state = PlaybackState::new(
        settings.order(),
        options.history_limit,
        options.shuffle_seed,
    );
    let mut scanner = TreeScanner::new(options.scan.clone());
    let mut session: Option<ActiveSession> = None;
    let mut timer = AdvanceTimer::new(state.order());
    publish(&snapshots, &state);

    loop {
        select! {
            _ = cancel.cancelled() => {
                debug!("sequencer disposed");
                break;
            }

            maybe_cmd = commands.recv() => match maybe_cmd {
                Some(SequencerCommand::Start { root, recursive }) => {
                    if let Some(previous) = session.take() {
                        previous.cancel.cancel();
                    }
                    let order = settings.order();
                    timer.reset(order);
                    state.begin_stream(order);
                    info!(root = %root.display(), recursive, %order, "starting stream");

                    let stream = scanner.start_streaming(root, recursive);
                    let (batch_tx, batch_rx) = mpsc::channel(64);
                    let session_cancel = cancel.child_token();
                    tokio::spawn(batch::run(
                        stream,
                        batch_tx,
                        options.batch.clone(),
                        session_cancel.clone(),
                    ));
                    session = Some(ActiveSession {
                        events: batch_rx,
                        cancel: session_cancel,
                    });
                }
                Some(SequencerCommand::Next) => {
                    if state.advance() {
                        timer.rearm(&mut state, &settings);
                    }
                }
                Some(SequencerCommand::Previous) => {
                    if state.retreat() {
                        timer.rearm(&mut state, &settings);
                    }
                }
                Some(SequencerCommand::GotoIndex(index)) => {
                    if state.goto_index(index) {
                        timer.rearm(&mut state, &settings);
                    } else {
                        debug!(index, len = state.len(), "ignoring out-of-range goto");
                    }
                }
                Some(SequencerCommand::TogglePlayPause) => {
                    state.toggle_play_pause();
                    timer.sync(&mut state, &settings);
                }
                Some(SequencerCommand::SetPlaying(playing)) => {
                    state.set_playing(playing);
                    timer.sync(&mut state, &settings);
                }
                Some(SequencerCommand::SetOrder(order)) => {
                    state.set_order(order);
                }
                Some(SequencerCommand::CancelScan) => {
                    if let Some(active) = session.as_ref() {
                        // The receiver stays open so the aggregator's final flush still lands.
                        active.cancel.cancel();
                    }
                    scanner.cancel();
                    state.cancel_scan();
                }
                None => {
                    debug!("all handles dropped; stopping sequencer");
                    break;
                }
            },

            maybe_ev = next_scan_event(&mut session) => match maybe_ev {
                Some(event) => apply_scan_event(event, &mut state, &mut timer, &settings),
                None => {
                    debug!("scan session drained");
                    session = None;
                }
            },

            _ = timer.tick() => {
                if !state.advance() {
                    debug!("advance tick waiting for more items");
                }
            }
        }

        publish(&snapshots, &state);
    }

    if let Some(active) = session.take() {
        active.cancel.cancel();
    }
    scanner.cancel();
    timer.disarm();
}

fn apply_scan_event<S: SettingsSource>(
    event: ScanEvent,
    state: &mut PlaybackState,
    timer: &mut AdvanceTimer,
    settings: &S,
) {
    match event {
        ScanEvent::ItemBatch { paths, total_found } => {
            debug!(size = paths.len(), total_found, "ingesting batch");
            if state.ingest_batch(paths) {
                timer.sync(state, settings);
            }
        }
        // Unbatched discoveries take the same route as a batch of one.
        ScanEvent::ItemFound { path, total_found } => apply_scan_event(
            ScanEvent::ItemBatch {
                paths: vec![path],
                total_found,
            },
            state,
            timer,
            settings,
        ),
        ScanEvent::Progress {
            current_directory,
            directories_scanned,
            items_found,
        } => {
            debug!(dirs = directories_scanned, items = items_found, "scan progress");
            state.record_progress(current_directory, directories_scanned);
        }
        ScanEvent::Complete {
            total_items,
            total_directories,
        } => {
            state.finish(total_items, total_directories);
            if state.is_empty() {
                info!(dirs = total_directories, "no media found");
            }
        }
        ScanEvent::Error { message, cause } => {
            warn!(%message, cause = cause.as_deref().unwrap_or("unknown"), "scan failed");
            state.fail(message);
        }
    }
}

/// Interval-driven advance, armed only while playback is running.
///
/// Arming samples the slide interval and the order mode from the settings
/// source. An order read from settings is applied only when it differs from
/// the previous sample, so an explicit `SetOrder` command stays in effect
/// until the setting itself changes.
struct AdvanceTimer {
    interval: Option<Interval>,
    settings_order: PlaybackOrder,
}

impl AdvanceTimer {
    fn new(settings_order: PlaybackOrder) -> Self {
        Self {
            interval: None,
            settings_order,
        }
    }

    /// Disarm and record the order a new stream started with.
    fn reset(&mut self, settings_order: PlaybackOrder) {
        self.interval = None;
        self.settings_order = settings_order;
    }

    fn disarm(&mut self) {
        self.interval = None;
    }

    fn is_armed(&self) -> bool {
        self.interval.is_some()
    }

    /// Arm or disarm to match the play state.
    fn sync<S: SettingsSource>(&mut self, state: &mut PlaybackState, settings: &S) {
        let wanted = state.is_playing() && !state.is_empty();
        match (wanted, self.is_armed()) {
            (true, false) => self.arm(state, settings),
            (false, true) => self.disarm(),
            _ => {}
        }
    }

    /// Restart the countdown after manual navigation so the new item gets a full interval.
    fn rearm<S: SettingsSource>(&mut self, state: &mut PlaybackState, settings: &S) {
        self.disarm();
        self.sync(state, settings);
    }

    fn arm<S: SettingsSource>(&mut self, state: &mut PlaybackState, settings: &S) {
        let order = settings.order();
        if order != self.settings_order {
            info!(%order, "order changed in settings");
            self.settings_order = order;
            state.set_order(order);
        }

        let period = settings.slide_interval().max(Duration::from_millis(1));
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(?period, "advance timer armed");
        self.interval = Some(interval);
    }

    async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

async fn next_scan_event(session: &mut Option<ActiveSession>) -> Option<ScanEvent> {
    match session {
        Some(active) => active.events.recv().await,
        None => std::future::pending().await,
    }
}

fn publish(snapshots: &watch::Sender<PlaybackSnapshot>, state: &PlaybackState) {
    let next = state.snapshot();
    snapshots.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}
