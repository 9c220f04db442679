use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::playback::DEFAULT_HISTORY_LIMIT;
use crate::scan::DEFAULT_EXTENSIONS;
use crate::tasks::batch::BatchOptions;
use crate::tasks::scanner::ScanOptions;
use crate::tasks::sequencer::SequencerOptions;

pub use config_model::{PlaybackOrder, SlideshowSettings};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Root directory to stream media from.
    pub library_path: PathBuf,
    /// Whether to descend into non-hidden subdirectories.
    pub recursive: bool,
    /// Interval and ordering, owned by the settings collaborator.
    pub slideshow: SlideshowSettings,
    /// Traversal tuning.
    pub scan: ScanSettings,
    /// Coalescing of discoveries before they reach the sequencer.
    pub batch: BatchSettings,
    /// How many visited items "previous" can walk back through.
    pub history_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ScanSettings {
    /// Accepted file extensions, case-insensitive, with or without a leading dot.
    pub extensions: Vec<String>,
    /// Directories between progress reports.
    pub progress_every: usize,
    /// Bounded capacity of the scanner's event channel.
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct BatchSettings {
    /// Flush once this many discoveries are buffered.
    pub max_items: usize,
    /// Flush once discoveries pause for this long.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(mut self) -> Result<Self> {
        self.slideshow.validate()?;
        ensure!(
            self.history_limit > 0,
            "history-limit must be greater than zero"
        );
        ensure!(
            self.batch.max_items > 0,
            "batch.max-items must be greater than zero"
        );
        ensure!(
            self.scan.progress_every > 0,
            "scan.progress-every must be greater than zero"
        );
        ensure!(
            self.scan.channel_capacity > 0,
            "scan.channel-capacity must be greater than zero"
        );
        self.scan.extensions = self
            .scan
            .extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        ensure!(
            !self.scan.extensions.is_empty(),
            "scan.extensions must list at least one extension"
        );
        Ok(self)
    }

    pub fn sequencer_options(&self) -> SequencerOptions {
        SequencerOptions {
            scan: ScanOptions {
                extensions: Some(self.scan.extensions.clone()),
                progress_every: self.scan.progress_every,
                channel_capacity: self.scan.channel_capacity,
            },
            batch: BatchOptions {
                max_items: self.batch.max_items,
                debounce: self.batch.debounce,
            },
            history_limit: self.history_limit,
            shuffle_seed: self.slideshow.shuffle_seed,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            library_path: PathBuf::new(),
            recursive: true,
            slideshow: SlideshowSettings::default(),
            scan: ScanSettings::default(),
            batch: BatchSettings::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        let defaults = ScanOptions::default();
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            progress_every: defaults.progress_every,
            channel_capacity: defaults.channel_capacity,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        let defaults = BatchOptions::default();
        Self {
            max_items: defaults.max_items,
            debounce: defaults.debounce,
        }
    }
}
