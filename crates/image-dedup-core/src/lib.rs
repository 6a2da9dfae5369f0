//! Core functionality for finding and managing near-duplicate images.
//!
//! This library provides the components of a duplicate scan:
//! - File discovery under a root directory
//! - Decoding and 64-bit perceptual fingerprints
//! - First-match grouping under a similarity threshold
//! - A cancellable, progress-reporting scan orchestrator
//! - Undoable deletion backed by verified backup copies
//!
//! ```no_run
//! use image_dedup_core::{Config, NoProgress, ScanOutcome, Scanner};
//! use std::path::Path;
//!
//! let scanner = Scanner::new(Config::default())?;
//! if let ScanOutcome::Completed(report) = scanner.scan(Path::new("photos"), &NoProgress)? {
//!     for group in &report.result {
//!         println!("{} has {} duplicates", group.original.display(), group.duplicates.len());
//!     }
//! }
//! # Ok::<(), image_dedup_core::Error>(())
//! ```

// -- Internal Modules --
mod error;

// -- Public Re-exports --
pub use config::*;
pub use error::{Error, Result};
pub use processing::{Fingerprint, NoProgress, ProgressSink, ProgressTracker, ScanEvent};
pub use safety::{BackupHandle, BatchOutcome, UndoLedger};
pub use scan::{
    scan_directory, CancellationToken, ScanHandle, ScanOutcome, ScanReport, ScanState, Scanner,
};
pub use types::*;

// -- Public Modules --
pub mod config;
pub mod deduplication;
pub mod discovery;
pub mod logging;
pub mod processing;
pub mod report;
pub mod safety;
pub mod scan;
pub mod types;
