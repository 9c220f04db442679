//! Cancellable, failure-tolerant directory traversal feeding a [`ScanEventStream`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::ScanError;
use crate::events::ScanEvent;
use crate::scan::{is_hidden, is_supported_media};
use crate::stream::{self, ScanEventSender, ScanEventStream};

/// Options controlling how a tree is scanned.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Optional override for allowed extensions (lowercase, without dot).
    pub extensions: Option<Vec<String>>,
    /// Emit a progress event after the first directory and then every N directories.
    pub progress_every: usize,
    /// Capacity of the bounded event channel between worker and consumer.
    pub channel_capacity: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: None,
            progress_every: 100,
            channel_capacity: 1024,
        }
    }
}

/// Running counters of one session, readable from any thread.
#[derive(Debug, Default)]
pub struct ScanCounters {
    items_found: AtomicUsize,
    directories_scanned: AtomicUsize,
}

impl ScanCounters {
    pub fn items_found(&self) -> usize {
        self.items_found.load(Ordering::Relaxed)
    }

    pub fn directories_scanned(&self) -> usize {
        self.directories_scanned.load(Ordering::Relaxed)
    }
}

/// One in-flight traversal.
#[derive(Debug)]
pub struct ScanSession {
    root: PathBuf,
    recursive: bool,
    cancel: CancellationToken,
    counters: Arc<ScanCounters>,
}

impl ScanSession {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn counters(&self) -> &ScanCounters {
        &self.counters
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Owns at most one active [`ScanSession`]; starting a new one cancels the previous.
#[derive(Debug, Default)]
pub struct TreeScanner {
    options: ScanOptions,
    session: Option<ScanSession>,
}

impl TreeScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            session: None,
        }
    }

    /// Begin scanning `root` on a blocking worker and return the event stream.
    ///
    /// Must be called from within a Tokio runtime. Root validation failures are
    /// reported as a terminal [`ScanEvent::Error`] on the returned stream.
    pub fn start_streaming(&mut self, root: impl Into<PathBuf>, recursive: bool) -> ScanEventStream {
        self.cancel();

        let root = root.into();
        let cancel = CancellationToken::new();
        let counters = Arc::new(ScanCounters::default());
        let (tx, stream) = stream::channel(self.options.channel_capacity, cancel.clone());

        let walker = Walker {
            root: root.clone(),
            recursive,
            extensions: self.options.extensions.clone(),
            progress_every: self.options.progress_every.max(1),
            counters: Arc::clone(&counters),
            tx: tx.clone(),
        };
        let worker = tokio::task::spawn_blocking(move || walker.run());
        tokio::spawn(supervise(worker, tx));

        self.session = Some(ScanSession {
            root,
            recursive,
            cancel,
            counters,
        });
        stream
    }

    /// Cancel the active session, if any.
    pub fn cancel(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(root = %session.root.display(), "cancelling scan session");
            session.cancel.cancel();
        }
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }
}

impl Drop for TreeScanner {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Converts a worker panic into a terminal error event.
async fn supervise(worker: JoinHandle<()>, tx: ScanEventSender) {
    match worker.await {
        Ok(()) => {}
        Err(err) if err.is_panic() => {
            let failure = ScanError::Aborted("traversal worker panicked".to_string());
            error!(error = %failure, "scan worker failed");
            let _ = tx
                .send(ScanEvent::Error {
                    message: failure.to_string(),
                    cause: Some(failure.cause().to_string()),
                })
                .await;
        }
        Err(err) => debug!(error = %err, "scan worker did not finish"),
    }
}

#[derive(Debug, Default)]
struct Listing {
    files: Vec<PathBuf>,
    subdirs: Vec<PathBuf>,
}

struct Walker {
    root: PathBuf,
    recursive: bool,
    extensions: Option<Vec<String>>,
    progress_every: usize,
    counters: Arc<ScanCounters>,
    tx: ScanEventSender,
}

impl Walker {
    #[instrument(skip_all, fields(root = %self.root.display(), recursive = self.recursive))]
    fn run(self) {
        if let Err(failure) = validate_root(&self.root) {
            warn!(error = %failure, "scan rejected");
            self.tx.send_blocking(ScanEvent::Error {
                message: failure.to_string(),
                cause: Some(failure.cause().to_string()),
            });
            return;
        }

        let stack = vec![self.root.clone()];
        self.walk(stack);
    }

    /// Depth-first traversal starting from `stack`, ending with a `Complete` event.
    fn walk(&self, mut stack: Vec<PathBuf>) {
        let mut dirs = 0usize;
        let mut items = 0usize;

        while let Some(dir) = stack.pop() {
            if self.tx.is_cancelled() {
                debug!(dirs, items, "scan cancelled");
                return;
            }

            let listing = self.list_directory(&dir);
            dirs += 1;
            self.counters.directories_scanned.store(dirs, Ordering::Relaxed);

            match listing {
                Ok(Listing { files, subdirs }) => {
                    for path in files {
                        items += 1;
                        self.counters.items_found.store(items, Ordering::Relaxed);
                        if !self.tx.send_blocking(ScanEvent::ItemFound {
                            path,
                            total_found: items,
                        }) {
                            debug!(dirs, items, "consumer gone; stopping scan");
                            return;
                        }
                    }
                    if self.recursive {
                        // Reversed so the first enumerated sibling is visited first.
                        stack.extend(subdirs.into_iter().rev());
                    }
                }
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "skipping unreadable directory");
                }
            }

            if (dirs == 1 || dirs % self.progress_every == 0)
                && !self.tx.send_blocking(ScanEvent::Progress {
                    current_directory: dir,
                    directories_scanned: dirs,
                    items_found: items,
                })
            {
                return;
            }
        }

        info!(dirs, items, "scan complete");
        self.tx.send_blocking(ScanEvent::Complete {
            total_items: items,
            total_directories: dirs,
        });
    }

    /// Enumerate `dir` once, splitting matching files from descendable subdirectories.
    fn list_directory(&self, dir: &Path) -> Result<Listing, walkdir::Error> {
        let mut listing = Listing::default();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                // Depth 0 means the directory itself could not be opened.
                Err(err) if err.depth() == 0 => return Err(err),
                Err(err) => {
                    debug!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                if !is_hidden(entry.file_name()) {
                    listing.subdirs.push(entry.into_path());
                }
            } else if entry.path().is_file()
                && is_supported_media(entry.path(), self.extensions.as_deref())
            {
                listing.files.push(entry.into_path());
            }
        }
        debug!(
            dir = %dir.display(),
            files = listing.files.len(),
            subdirs = listing.subdirs.len(),
            "directory listed"
        );
        Ok(listing)
    }
}

fn validate_root(root: &Path) -> Result<(), ScanError> {
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ScanError::NotADirectory(root.to_path_buf())),
        Err(_) => Err(ScanError::RootNotFound(root.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn walker(root: &Path) -> (Walker, ScanEventStream) {
        let (tx, stream) = stream::channel(64, CancellationToken::new());
        let walker = Walker {
            root: root.to_path_buf(),
            recursive: true,
            extensions: None,
            progress_every: 100,
            counters: Arc::new(ScanCounters::default()),
            tx,
        };
        (walker, stream)
    }

    #[test]
    fn vanished_directory_fails_its_own_listing() {
        let tmp = tempdir().unwrap();
        let gone = tmp.path().join("gone");
        fs::create_dir(&gone).unwrap();
        fs::write(gone.join("a.jpg"), b"x").unwrap();
        let (walker, _stream) = walker(tmp.path());

        let listing = walker.list_directory(tmp.path()).unwrap();
        assert_eq!(listing.subdirs, vec![gone.clone()]);

        fs::remove_dir_all(&gone).unwrap();
        let err = walker.list_directory(&gone).unwrap_err();
        assert_eq!(err.depth(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreadable_directory_is_counted_and_skipped() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.jpg"), b"x").unwrap();
        let (walker, mut stream) = walker(tmp.path());
        let counters = Arc::clone(&walker.counters);

        // A stacked directory that no longer exists stands in for one that cannot be read.
        let missing = tmp.path().join("removed");
        let worker = tokio::task::spawn_blocking(move || walker.walk(vec![missing]));
        worker.await.unwrap();

        let mut events = Vec::new();
        while let Some(ev) = stream.recv().await {
            events.push(ev);
        }
        assert_eq!(
            events.last(),
            Some(&ScanEvent::Complete {
                total_items: 0,
                total_directories: 1
            })
        );
        assert_eq!(counters.directories_scanned(), 1);
    }

    #[test]
    fn validate_root_distinguishes_missing_and_file() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        fs::write(&file, b"x").unwrap();

        assert!(validate_root(tmp.path()).is_ok());
        assert!(matches!(
            validate_root(&tmp.path().join("missing")),
            Err(ScanError::RootNotFound(_))
        ));
        assert!(matches!(
            validate_root(&file),
            Err(ScanError::NotADirectory(_))
        ));
    }
}
