//! Playback ordering over a collection that keeps growing while it is shown.
//!
//! [`PlaybackState`] is a synchronous state machine; the sequencer task owns
//! exactly one instance and serializes every mutation through it. Readers get
//! immutable [`PlaybackSnapshot`]s.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use config_model::PlaybackOrder;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info};

/// Default bound on the "previous" history.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Lifecycle of the scan feeding the collection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanStatus {
    #[default]
    Idle,
    Streaming,
    Completed {
        total_directories: usize,
    },
    /// The scan finished successfully without discovering anything.
    NoMediaFound {
        directories_scanned: usize,
    },
    /// The scan was stopped by the caller; discovered items stay playable.
    Cancelled,
    Failed {
        message: String,
    },
}

impl ScanStatus {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Streaming)
    }
}

/// Capped record of visited item indices, most recent last.
#[derive(Debug, Clone)]
pub struct PlayHistory {
    entries: VecDeque<usize>,
    limit: usize,
}

impl PlayHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, index: usize) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(index);
    }

    /// Drop the newest entry and return the one that becomes newest.
    ///
    /// A history with a single entry cannot step back.
    pub fn step_back(&mut self) -> Option<usize> {
        if self.entries.len() <= 1 {
            return None;
        }
        self.entries.pop_back();
        self.entries.back().copied()
    }

    pub fn last(&self) -> Option<usize> {
        self.entries.back().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().copied()
    }
}

#[derive(Debug, Clone)]
struct Shuffle {
    order: Vec<usize>,
    position: usize,
}

/// Items, cursor, history and shuffle for one streaming session.
///
/// Rules:
/// - `items` is append-only in discovery order.
/// - Random mode keeps `shuffle.order` a permutation of every ingested index.
/// - Indices at or before the shuffle cursor are never moved by later ingestion.
/// - Advancing past the known end waits while the scan is still streaming.
#[derive(Debug)]
pub struct PlaybackState {
    items: Vec<PathBuf>,
    current_index: usize,
    is_playing: bool,
    status: ScanStatus,
    order: PlaybackOrder,
    shuffle: Option<Shuffle>,
    history: PlayHistory,
    directories_scanned: usize,
    current_directory: Option<PathBuf>,
    rng: StdRng,
}

impl PlaybackState {
    pub fn new(order: PlaybackOrder, history_limit: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(order, history_limit, rng)
    }

    pub fn with_rng(order: PlaybackOrder, history_limit: usize, rng: StdRng) -> Self {
        Self {
            items: Vec::new(),
            current_index: 0,
            is_playing: true,
            status: ScanStatus::Idle,
            order,
            shuffle: None,
            history: PlayHistory::new(history_limit),
            directories_scanned: 0,
            current_directory: None,
            rng,
        }
    }

    /// Discard the collection and enter the streaming state for a new scan.
    ///
    /// The play/pause preference survives; everything derived from items does not.
    pub fn begin_stream(&mut self, order: PlaybackOrder) {
        self.items.clear();
        self.current_index = 0;
        self.status = ScanStatus::Streaming;
        self.order = order;
        self.shuffle = None;
        self.history.clear();
        self.directories_scanned = 0;
        self.current_directory = None;
    }

    /// Append newly discovered items.
    ///
    /// Returns `true` when this batch made the collection playable for the first time.
    pub fn ingest_batch(&mut self, paths: Vec<PathBuf>) -> bool {
        if paths.is_empty() {
            return false;
        }
        let start = self.items.len();
        self.items.extend(paths);

        if start == 0 {
            self.current_index = 0;
            if self.order == PlaybackOrder::Random {
                self.initialize_shuffle(0);
            }
            self.history.clear();
            self.history.push(0);
            debug!(items = self.items.len(), order = %self.order, "collection became playable");
            true
        } else {
            self.extend_shuffle(start);
            false
        }
    }

    /// Move forward one item. Returns `false` when nothing changed.
    pub fn advance(&mut self) -> bool {
        if self.items.is_empty() {
            return false;
        }
        let next = match self.order {
            PlaybackOrder::Sequential => self.next_sequential(),
            PlaybackOrder::Random => self.next_random(),
        };
        let Some(next) = next else {
            return false;
        };
        self.current_index = next;
        self.history.push(next);
        true
    }

    /// Move backward one item. Returns `false` when nothing changed.
    pub fn retreat(&mut self) -> bool {
        if self.items.is_empty() {
            return false;
        }
        match self.order {
            PlaybackOrder::Sequential => {
                let prev = self
                    .current_index
                    .checked_sub(1)
                    .unwrap_or(self.items.len() - 1);
                self.current_index = prev;
                self.history.push(prev);
                true
            }
            PlaybackOrder::Random => {
                let Some(restored) = self.history.step_back() else {
                    return false;
                };
                self.current_index = restored;
                // Re-anchor the cursor on the restored item so forward play resumes after it.
                if let Some(shuffle) = self.shuffle.as_mut() {
                    shuffle.position = shuffle
                        .order
                        .iter()
                        .position(|&i| i == restored)
                        .unwrap_or_else(|| shuffle.position.saturating_sub(1));
                }
                true
            }
        }
    }

    /// Jump to `index`. Out-of-range indices are ignored.
    pub fn goto_index(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.current_index = index;
        self.history.push(index);
        true
    }

    /// Returns `true` if the flag changed.
    pub fn set_playing(&mut self, playing: bool) -> bool {
        let changed = self.is_playing != playing;
        self.is_playing = playing;
        changed
    }

    /// Flip play/pause and return the new state.
    pub fn toggle_play_pause(&mut self) -> bool {
        self.is_playing = !self.is_playing;
        self.is_playing
    }

    /// Switch ordering policy mid-playback, keeping the current item on screen.
    pub fn set_order(&mut self, order: PlaybackOrder) {
        if self.order == order {
            return;
        }
        self.order = order;
        match order {
            PlaybackOrder::Random if !self.items.is_empty() => {
                self.initialize_shuffle(self.current_index);
            }
            PlaybackOrder::Random => {}
            PlaybackOrder::Sequential => self.shuffle = None,
        }
        debug!(order = %order, "playback order changed");
    }

    pub fn record_progress(
        &mut self,
        current_directory: PathBuf,
        directories_scanned: usize,
    ) {
        if !self.status.is_streaming() {
            return;
        }
        self.directories_scanned = directories_scanned;
        self.current_directory = Some(current_directory);
    }

    pub fn finish(&mut self, total_items: usize, total_directories: usize) {
        if !self.status.is_streaming() {
            return;
        }
        self.directories_scanned = total_directories;
        self.current_directory = None;
        self.status = if self.items.is_empty() {
            ScanStatus::NoMediaFound {
                directories_scanned: total_directories,
            }
        } else {
            ScanStatus::Completed { total_directories }
        };
        info!(
            total_items,
            ingested = self.items.len(),
            total_directories,
            "scan finished"
        );
    }

    pub fn fail(&mut self, message: String) {
        if !self.status.is_streaming() {
            return;
        }
        self.current_directory = None;
        self.status = ScanStatus::Failed { message };
    }

    pub fn cancel_scan(&mut self) {
        if self.status.is_streaming() {
            self.current_directory = None;
            self.status = ScanStatus::Cancelled;
        }
    }

    pub fn items(&self) -> &[PathBuf] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.current_index)
    }

    pub fn current_item(&self) -> Option<&Path> {
        self.items.get(self.current_index).map(PathBuf::as_path)
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn order(&self) -> PlaybackOrder {
        self.order
    }

    pub fn status(&self) -> &ScanStatus {
        &self.status
    }

    pub fn scan_complete(&self) -> bool {
        matches!(
            self.status,
            ScanStatus::Completed { .. } | ScanStatus::NoMediaFound { .. }
        )
    }

    pub fn shuffle_order(&self) -> Option<&[usize]> {
        self.shuffle.as_ref().map(|s| s.order.as_slice())
    }

    pub fn shuffle_position(&self) -> Option<usize> {
        self.shuffle.as_ref().map(|s| s.position)
    }

    pub fn history(&self) -> &PlayHistory {
        &self.history
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            current_item: self.current_item().map(Path::to_path_buf),
            current_index: self.current_index(),
            total_items: self.items.len(),
            status: self.status.clone(),
            directories_scanned: self.directories_scanned,
            current_directory: self.current_directory.clone(),
            is_playing: self.is_playing,
            order: self.order,
        }
    }

    fn next_sequential(&self) -> Option<usize> {
        let next = self.current_index + 1;
        if next < self.items.len() {
            Some(next)
        } else if self.status.is_streaming() {
            None
        } else {
            Some(0)
        }
    }

    fn next_random(&mut self) -> Option<usize> {
        let len = self.items.len();
        let awaiting_items = self.status.is_streaming();
        let shuffle = self.shuffle.as_mut()?;
        if shuffle.position + 1 < shuffle.order.len() {
            shuffle.position += 1;
            return Some(shuffle.order[shuffle.position]);
        }
        if awaiting_items {
            return None;
        }

        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut self.rng);
        // Avoid replaying the item that is already on screen.
        if len > 1 && order[0] == self.current_index {
            let swap = self.rng.random_range(1..len);
            order.swap(0, swap);
        }
        debug!(items = len, "full reshuffle");
        shuffle.order = order;
        shuffle.position = 0;
        Some(shuffle.order[0])
    }

    /// Fresh permutation of every item with `pinned` fixed at the front.
    fn initialize_shuffle(&mut self, pinned: usize) {
        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.swap(0, pinned);
        order[1..].shuffle(&mut self.rng);
        self.shuffle = Some(Shuffle { order, position: 0 });
    }

    /// Mix indices `start..len` into the not-yet-played part of the shuffle.
    fn extend_shuffle(&mut self, start: usize) {
        let Some(shuffle) = self.shuffle.as_mut() else {
            return;
        };
        for index in start..self.items.len() {
            let at = self
                .rng
                .random_range(shuffle.position + 1..=shuffle.order.len());
            shuffle.order.insert(at, index);
        }
    }
}

/// Immutable view of the sequencer published to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlaybackSnapshot {
    pub current_item: Option<PathBuf>,
    pub current_index: Option<usize>,
    pub total_items: usize,
    pub status: ScanStatus,
    pub directories_scanned: usize,
    pub current_directory: Option<PathBuf>,
    pub is_playing: bool,
    pub order: PlaybackOrder,
}

impl PlaybackSnapshot {
    pub fn scan_in_progress(&self) -> bool {
        self.status.is_streaming()
    }

    pub fn scan_complete(&self) -> bool {
        matches!(
            self.status,
            ScanStatus::Completed { .. } | ScanStatus::NoMediaFound { .. }
        )
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            ScanStatus::Failed { message } => Some(message),
            _ => None,
        }
    }

    /// Directories scanned when the scan completed empty.
    pub fn no_media_found(&self) -> Option<usize> {
        match self.status {
            ScanStatus::NoMediaFound {
                directories_scanned,
            } => Some(directories_scanned),
            _ => None,
        }
    }

    pub fn current_directory_name(&self) -> Option<String> {
        let dir = self.current_directory.as_ref()?;
        Some(
            dir.file_name()
                .unwrap_or(dir.as_os_str())
                .to_string_lossy()
                .into_owned(),
        )
    }

    /// `"i / N"`, with a trailing `+` while the total can still grow.
    pub fn position_label(&self) -> Option<String> {
        let index = self.current_index?;
        let suffix = if self.scan_in_progress() { "+" } else { "" };
        Some(format!("{} / {}{}", index + 1, self.total_items, suffix))
    }
}

/// Run the state machine offline over a finished collection.
///
/// Returns the initially shown item followed by `steps` advances.
pub fn simulate_playback<I>(
    paths: I,
    order: PlaybackOrder,
    steps: usize,
    seed: Option<u64>,
) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut state = PlaybackState::new(order, DEFAULT_HISTORY_LIMIT, seed);
    state.begin_stream(order);
    state.ingest_batch(paths.into_iter().collect());
    let total = state.len();
    state.finish(total, 1);

    let mut plan = Vec::new();
    if let Some(first) = state.current_item() {
        plan.push(first.to_path_buf());
    }
    for _ in 0..steps {
        if !state.advance() {
            break;
        }
        if let Some(item) = state.current_item() {
            plan.push(item.to_path_buf());
        }
    }
    plan
}
