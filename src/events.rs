use std::path::PathBuf;

use config_model::PlaybackOrder;

/// Events flowing from the tree scanner (and batch aggregator) to consumers.
///
/// Exactly one `Complete` or `Error` ends a stream; nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    ItemFound {
        path: PathBuf,
        total_found: usize,
    },
    ItemBatch {
        paths: Vec<PathBuf>,
        total_found: usize,
    },
    Progress {
        current_directory: PathBuf,
        directories_scanned: usize,
        items_found: usize,
    },
    Complete {
        total_items: usize,
        total_directories: usize,
    },
    Error {
        message: String,
        cause: Option<String>,
    },
}

impl ScanEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Commands accepted by the sequencer task from the presentation layer.
#[derive(Debug, Clone)]
pub enum SequencerCommand {
    Start { root: PathBuf, recursive: bool },
    Next,
    Previous,
    GotoIndex(usize),
    TogglePlayPause,
    SetPlaying(bool),
    SetOrder(PlaybackOrder),
    CancelScan,
}
