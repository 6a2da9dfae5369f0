//! Scan orchestration: discovery → decode → fingerprint → group.
//!
//! A scan moves through the states
//!
//! ```text
//! Idle -> Discovering -> Processing -> Finalizing -> Done
//! ```
//!
//! with `Cancelled` reachable from `Discovering`/`Processing` and `Errored`
//! reachable from anywhere. Candidates are handled in chunks; progress is
//! reported and the cancellation flag is checked between chunks (and between
//! files when decoding sequentially). A decode that has started always runs
//! to completion.

use crossbeam::channel::{unbounded, Receiver};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::deduplication::SimilarityGrouper;
use crate::discovery::{discover_cancellable, resolve_root, Discovery};
use crate::error::{Error, Result};
use crate::logging::{log_hash_error, log_skipped};
use crate::processing::file_validation::validate_before_decode;
use crate::processing::{fingerprint_from_file, ChannelProgress, ProgressSink, ScanEvent};
use crate::report;
use crate::types::{ImageFile, ImageRecord, ScanResult, SimilarityThreshold, SkipReason, SkippedFile};

/// Lifecycle of a single scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Discovering,
    Processing,
    Finalizing,
    Done,
    Cancelled,
    Errored,
}

impl ScanState {
    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Done | ScanState::Cancelled | ScanState::Errored)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(self, next: ScanState) -> bool {
        use ScanState::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Errored) => true,
            (Idle, Discovering) => true,
            (Discovering, Processing) | (Discovering, Cancelled) => true,
            // Fewer than two candidates ends the scan straight after discovery
            (Discovering, Done) => true,
            (Processing, Finalizing) | (Processing, Cancelled) => true,
            (Finalizing, Done) => true,
            _ => false,
        }
    }
}

/// Cooperative stop signal shared between a scan and its caller
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the scan stop at the next unit-of-work boundary
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a scan that ran to completion
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Duplicate groups found
    pub result: ScanResult,

    /// Number of candidates after discovery
    pub candidates: usize,

    /// Number of images successfully fingerprinted
    pub processed: usize,

    /// Files left out during discovery or decoding
    pub skipped: Vec<SkippedFile>,

    /// Wall-clock duration of the scan
    pub elapsed: Duration,
}

impl ScanReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Human readable one-line summary
    pub fn summary(&self) -> String {
        report::summary(&self.result)
    }
}

/// Terminal outcome of a scan that did not fail
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// All candidates were processed
    Completed(ScanReport),

    /// Discovery found fewer than two candidates; nothing to compare
    NotEnoughImages {
        found: usize,
        skipped: Vec<SkippedFile>,
    },

    /// The scan was stopped; partial results are discarded
    Cancelled,
}

impl ScanOutcome {
    /// The duplicate groups, empty unless the scan completed
    pub fn result(&self) -> ScanResult {
        match self {
            ScanOutcome::Completed(report) => report.result.clone(),
            _ => ScanResult::default(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanOutcome::Cancelled)
    }

    /// Human readable one-line summary
    pub fn summary(&self) -> String {
        match self {
            ScanOutcome::Completed(report) => report.summary(),
            ScanOutcome::NotEnoughImages { found, .. } => {
                format!("Not enough images to compare (found {}).", found)
            }
            ScanOutcome::Cancelled => "Scan cancelled.".to_string(),
        }
    }
}

/// What happened to one candidate during processing
enum FileOutcome {
    Fingerprinted(ImageRecord),
    Skipped(SkippedFile),
    /// Cancellation was observed before this file was started
    NotStarted,
}

/// Tracks the current state and keeps reported progress non-decreasing
struct ScanProgress<'a> {
    sink: &'a dyn ProgressSink,
    state: Cell<ScanState>,
    last_percent: Cell<Option<u8>>,
}

impl<'a> ScanProgress<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            state: Cell::new(ScanState::Idle),
            last_percent: Cell::new(None),
        }
    }

    fn enter(&self, next: ScanState) {
        let current = self.state.get();
        if !current.can_transition_to(next) {
            warn!("Unexpected scan transition {:?} -> {:?}", current, next);
            return;
        }
        debug!("Scan state {:?} -> {:?}", current, next);
        self.state.set(next);
        self.sink.state_changed(next);
    }

    fn report(&self, percent: u8) {
        let percent = match self.last_percent.get() {
            Some(last) => percent.max(last),
            None => percent,
        }
        .min(100);
        self.last_percent.set(Some(percent));
        self.sink.progress(percent);
    }
}

/// Integer percentage that only reaches 100 when everything is done
fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done * 100) / total).min(99) as u8
}

/// Drives a duplicate scan according to a [`Config`]
pub struct Scanner {
    config: Config,
    threshold: SimilarityThreshold,
    pool: Option<rayon::ThreadPool>,
    cancel: CancellationToken,
}

impl Scanner {
    /// Create a scanner, validating the configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let threshold = config.threshold()?;

        let pool = if config.parallel_decode {
            let threads = config.effective_threads();
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("image-decode-{}", i))
                .build()
                .map_err(|e| Error::Unknown(format!("Failed to build thread pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            config,
            threshold,
            pool,
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops this scanner's scans
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a scan on the current thread.
    ///
    /// Only an invalid root or an internal fault is returned as `Err`; files
    /// that cannot be read are collected in the report's `skipped` list.
    pub fn scan(&self, root: &Path, sink: &dyn ProgressSink) -> Result<ScanOutcome> {
        let start = Instant::now();
        let progress = ScanProgress::new(sink);

        let root = match resolve_root(root) {
            Ok(root) => root,
            Err(e) => {
                progress.enter(ScanState::Errored);
                return Err(e);
            }
        };

        info!(
            "Scanning {} (recursive: {}, threshold: {})",
            root.display(),
            self.config.recursive_search,
            self.threshold
        );

        progress.enter(ScanState::Discovering);
        if self.cancel.is_cancelled() {
            return Ok(self.cancelled(&progress));
        }

        let discovery = match discover_cancellable(
            &root,
            self.config.recursive_search,
            &self.config,
            &self.cancel,
        ) {
            Ok(Some(discovery)) => discovery,
            Ok(None) => return Ok(self.cancelled(&progress)),
            Err(e) => {
                progress.enter(ScanState::Errored);
                return Err(e);
            }
        };

        let Discovery {
            candidates,
            mut skipped,
        } = discovery;
        let total = candidates.len();

        if total < 2 {
            info!("Not enough images to compare ({} found)", total);
            progress.enter(ScanState::Done);
            progress.report(100);
            return Ok(ScanOutcome::NotEnoughImages {
                found: total,
                skipped,
            });
        }

        progress.enter(ScanState::Processing);
        progress.report(0);

        let mut grouper = SimilarityGrouper::new(self.threshold, self.config.grouping);
        let mut processed = 0;
        let mut done = 0;

        for chunk in candidates.chunks(self.config.chunk_size) {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(&progress));
            }

            // Results come back in chunk order, whichever thread produced them
            for outcome in self.fingerprint_chunk(chunk) {
                match outcome {
                    FileOutcome::Fingerprinted(record) => {
                        grouper.observe(record.path, record.fingerprint);
                        processed += 1;
                    }
                    FileOutcome::Skipped(skip) => {
                        log_skipped(&skip);
                        skipped.push(skip);
                    }
                    FileOutcome::NotStarted => {}
                }
            }

            done += chunk.len();
            progress.report(percent_of(done, total));
        }

        if self.cancel.is_cancelled() {
            return Ok(self.cancelled(&progress));
        }

        progress.enter(ScanState::Finalizing);
        let result = grouper.finalize();

        let report = ScanReport {
            result,
            candidates: total,
            processed,
            skipped,
            elapsed: start.elapsed(),
        };

        info!(
            "Scan finished in {:.2}s: {} processed, {} skipped. {}",
            report.elapsed.as_secs_f64(),
            report.processed,
            report.skipped_count(),
            report.summary()
        );

        progress.enter(ScanState::Done);
        progress.report(100);
        Ok(ScanOutcome::Completed(report))
    }

    /// Run the scan on a dedicated worker thread.
    ///
    /// Progress and state changes arrive on [`ScanHandle::events`]; the
    /// channel disconnects when the scan ends.
    pub fn spawn(self, root: impl Into<PathBuf>) -> Result<ScanHandle> {
        let root = root.into();
        let (tx, rx) = unbounded();
        let cancel = self.cancel.clone();

        let worker = std::thread::Builder::new()
            .name("image-scan".to_string())
            .spawn(move || {
                let sink = ChannelProgress::new(tx);
                self.scan(&root, &sink)
            })?;

        Ok(ScanHandle {
            events: rx,
            cancel,
            worker,
        })
    }

    fn cancelled(&self, progress: &ScanProgress<'_>) -> ScanOutcome {
        info!("Scan cancelled");
        progress.enter(ScanState::Cancelled);
        // Completion signal for listeners waiting on 100
        progress.report(100);
        ScanOutcome::Cancelled
    }

    fn fingerprint_chunk(&self, chunk: &[ImageFile]) -> Vec<FileOutcome> {
        let cancel = &self.cancel;
        let work = |file: &ImageFile| {
            if cancel.is_cancelled() {
                FileOutcome::NotStarted
            } else {
                fingerprint_candidate(file)
            }
        };

        match &self.pool {
            Some(pool) => pool.install(|| chunk.par_iter().map(work).collect()),
            None => chunk.iter().map(work).collect(),
        }
    }
}

/// Validate, decode and fingerprint one candidate
fn fingerprint_candidate(file: &ImageFile) -> FileOutcome {
    let skip = |reason| {
        FileOutcome::Skipped(SkippedFile {
            path: file.path.clone(),
            reason,
        })
    };

    let size_bytes = match validate_before_decode(&file.path) {
        Ok(size) => size,
        Err(reason) => return skip(reason),
    };

    // Some decoders panic on malformed input; treat that like a decode error
    let decoded = panic::catch_unwind(AssertUnwindSafe(|| fingerprint_from_file(&file.path)));

    match decoded {
        Ok(Ok(fingerprint)) => FileOutcome::Fingerprinted(ImageRecord {
            path: file.path.clone(),
            size_bytes,
            fingerprint,
        }),
        Ok(Err(e)) => {
            log_hash_error(&file.path, &e);
            let reason = match e {
                Error::Unreadable { reason, .. } => reason,
                other => other.to_string(),
            };
            if file.format.is_best_effort() {
                debug!("Best-effort format could not be decoded: {}", file.path.display());
            }
            skip(SkipReason::Undecodable(reason))
        }
        Err(_) => skip(SkipReason::Undecodable("decoder panicked".to_string())),
    }
}

/// Handle to a scan running on its own thread
pub struct ScanHandle {
    events: Receiver<ScanEvent>,
    cancel: CancellationToken,
    worker: JoinHandle<Result<ScanOutcome>>,
}

impl ScanHandle {
    /// Stream of state and progress events
    pub fn events(&self) -> &Receiver<ScanEvent> {
        &self.events
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the scan to end and return its outcome
    pub fn join(self) -> Result<ScanOutcome> {
        self.worker
            .join()
            .map_err(|_| Error::Unknown("scan worker panicked".to_string()))?
    }
}

/// Scan `root` with default settings apart from the given recursion flag and
/// similarity threshold.
pub fn scan_directory(
    root: &Path,
    recursive: bool,
    similarity_threshold: u8,
    sink: &dyn ProgressSink,
) -> Result<ScanOutcome> {
    let config = Config {
        similarity_threshold,
        recursive_search: recursive,
        ..Config::default()
    };
    Scanner::new(config)?.scan(root, sink)
}
