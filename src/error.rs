use std::path::PathBuf;

use thiserror::Error;

/// Conditions that abort a whole scan session.
///
/// Per-directory read failures are not represented here: the scanner absorbs
/// them and only counts the directory.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The selected root does not exist or cannot be inspected.
    #[error("folder not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// The selected root exists but is not a directory.
    #[error("not a folder: {}", .0.display())]
    NotADirectory(PathBuf),

    /// The traversal worker failed for a reason unrelated to one directory.
    #[error("scan aborted: {0}")]
    Aborted(String),
}

impl ScanError {
    /// Short machine-oriented cause attached to terminal error events.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::RootNotFound(_) => "root-not-found",
            Self::NotADirectory(_) => "not-a-directory",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// The sequencer task is no longer running, so commands cannot be delivered.
#[derive(Debug, Error)]
#[error("sequencer task has stopped")]
pub struct SequencerClosed;
