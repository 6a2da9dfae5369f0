//! Undoable file-system changes.
//!
//! Every deletion goes through an [`UndoLedger`]: the file is first copied to
//! the ledger's backup directory, the copy is checked to be byte-identical,
//! and only then is the original removed. Undo restores from that backup, so
//! recovery never depends on how the operating system handles trash.

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::{log_file_error, log_fs_modification};
use crate::processing::compute_cryptographic;

/// Metadata key holding the Blake3 digest of the file at the time of the change
const META_BLAKE3: &str = "blake3";
const META_SIZE: &str = "size";

/// Kind of recorded file-system change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    /// `source` was removed; `destination` holds the backup copy
    Delete,
    /// `source` was moved to `destination`
    Move,
}

/// One entry of the undo history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    /// Assigned by the ledger when recorded
    pub id: u64,
    pub kind: OperationKind,
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Local>,
}

impl FileOperation {
    /// A deletion of `original` whose contents were saved at `backup`
    pub fn delete(original: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self::new(OperationKind::Delete, original.into(), Some(backup.into()))
    }

    /// A move from `source` to `destination`
    pub fn moved(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self::new(OperationKind::Move, source.into(), Some(destination.into()))
    }

    fn new(kind: OperationKind, source: PathBuf, destination: Option<PathBuf>) -> Self {
        Self {
            id: 0,
            kind,
            source,
            destination,
            metadata: BTreeMap::new(),
            timestamp: Local::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Receipt for a deletion, usable to undo exactly that deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHandle {
    id: u64,
    original: PathBuf,
    backup: PathBuf,
}

impl BackupHandle {
    /// Where the file lived before it was deleted
    pub fn original(&self) -> &Path {
        &self.original
    }

    /// Where the backup copy is kept
    pub fn backup(&self) -> &Path {
        &self.backup
    }
}

/// A file a batch operation could not handle
#[derive(Debug)]
pub struct OperationFailure {
    pub path: PathBuf,
    pub error: Error,
}

/// Result of a batch deletion; one failure never aborts the batch
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<BackupHandle>,
    pub failures: Vec<OperationFailure>,
}

impl BatchOutcome {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
struct History {
    operations: VecDeque<FileOperation>,
    next_id: u64,
}

/// Bounded, thread-safe history of undoable file operations
#[derive(Debug)]
pub struct UndoLedger {
    backup_dir: PathBuf,
    max_history: usize,
    history: Mutex<History>,
}

impl UndoLedger {
    pub fn new(backup_dir: impl Into<PathBuf>, max_history: usize) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            max_history: max_history.max(1),
            history: Mutex::new(History::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.backup_dir.clone(), config.max_history)
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn history(&self) -> MutexGuard<'_, History> {
        // The history is a plain queue; a panic elsewhere cannot leave it torn
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an operation, evicting the oldest beyond the history bound.
    /// Returns the id assigned to it.
    pub fn record(&self, mut operation: FileOperation) -> u64 {
        let mut history = self.history();
        history.next_id += 1;
        operation.id = history.next_id;
        let id = operation.id;

        debug!("Recording {:?} of {}", operation.kind, operation.source.display());
        history.operations.push_back(operation);

        while history.operations.len() > self.max_history {
            if let Some(evicted) = history.operations.pop_front() {
                if let (OperationKind::Delete, Some(backup)) = (evicted.kind, &evicted.destination) {
                    warn!(
                        "Undo history full; backup of {} kept at {} but can no longer be undone",
                        evicted.source.display(),
                        backup.display()
                    );
                }
            }
        }

        id
    }

    /// Delete `path`, keeping a verified backup so the deletion can be undone
    pub fn delete(&self, path: &Path) -> Result<BackupHandle> {
        let failed = |reason: String| Error::DeletionFailed {
            path: path.to_path_buf(),
            reason,
        };

        let metadata = fs::metadata(path).map_err(|e| failed(e.to_string()))?;
        if !metadata.is_file() {
            return Err(failed("not a regular file".to_string()));
        }

        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| failed(format!("cannot create backup directory: {}", e)))?;

        let file_name = path
            .file_name()
            .ok_or_else(|| failed("path has no file name".to_string()))?;
        let (backup, mut target) = claim_backup_path(&self.backup_dir, Path::new(file_name))
            .map_err(|e| failed(format!("cannot create backup file: {}", e)))?;

        let copied = File::open(path)
            .and_then(|mut source| io::copy(&mut source, &mut target))
            .and_then(|_| target.sync_all());
        drop(target);
        if let Err(e) = copied {
            discard_backup(&backup);
            return Err(failed(format!("backup copy failed: {}", e)));
        }

        let digest = match verify_identical(path, &backup) {
            Ok(digest) => digest,
            Err(reason) => {
                discard_backup(&backup);
                return Err(failed(reason));
            }
        };

        if let Err(e) = fs::remove_file(path) {
            log_file_error(path, "delete", &e);
            discard_backup(&backup);
            return Err(failed(e.to_string()));
        }

        log_fs_modification(
            "delete",
            path,
            Some(&format!("backup at {}", backup.display())),
        );

        let operation = FileOperation::delete(path, &backup)
            .with_metadata(META_BLAKE3, digest)
            .with_metadata(META_SIZE, metadata.len());
        let id = self.record(operation);

        Ok(BackupHandle {
            id,
            original: path.to_path_buf(),
            backup,
        })
    }

    /// Delete every path, collecting failures instead of stopping at the first
    pub fn delete_all<I, P>(&self, paths: I) -> BatchOutcome
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut outcome = BatchOutcome::default();

        for path in paths {
            let path = path.as_ref();
            match self.delete(path) {
                Ok(handle) => outcome.succeeded.push(handle),
                Err(e) => {
                    error!("Could not delete {}: {}", path.display(), e);
                    outcome.failures.push(OperationFailure {
                        path: path.to_path_buf(),
                        error: e,
                    });
                }
            }
        }

        info!(
            "Deleted {} files ({} failed)",
            outcome.success_count(),
            outcome.failures.len()
        );
        outcome
    }

    /// Move `source` to `destination` and record the move
    pub fn move_file(&self, source: &Path, destination: &Path) -> Result<()> {
        if !source.is_file() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a file", source.display()),
            )));
        }
        if destination.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("{} already exists", destination.display()),
            )));
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        move_path(source, destination)?;

        log_fs_modification(
            "move",
            source,
            Some(&format!("to {}", destination.display())),
        );
        self.record(FileOperation::moved(source, destination));
        Ok(())
    }

    /// Undo the most recent operation. Returns `false` when the history is
    /// empty or the undo failed; a failed entry is dropped from the history.
    pub fn undo_last(&self) -> bool {
        let operation = self.history().operations.pop_back();
        match operation {
            Some(operation) => apply_undo(&operation),
            None => {
                debug!("Nothing to undo");
                false
            }
        }
    }

    /// Undo the deletion identified by `handle`, wherever it sits in the
    /// history
    pub fn undo(&self, handle: &BackupHandle) -> bool {
        let operation = {
            let mut history = self.history();
            let position = history.operations.iter().position(|op| op.id == handle.id);
            position.and_then(|index| history.operations.remove(index))
        };

        match operation {
            Some(operation) => apply_undo(&operation),
            None => {
                warn!(
                    "No undoable operation for {} (already undone or evicted)",
                    handle.original.display()
                );
                false
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.history().operations.is_empty()
    }

    pub fn last_operation(&self) -> Option<FileOperation> {
        self.history().operations.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.history().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history().operations.is_empty()
    }

    /// Forget the whole history. Backup files stay on disk.
    pub fn clear(&self) {
        self.history().operations.clear();
    }
}

fn apply_undo(operation: &FileOperation) -> bool {
    match undo_operation(operation) {
        Ok(()) => true,
        Err(e) => {
            error!("{}", e);
            false
        }
    }
}

fn undo_operation(operation: &FileOperation) -> Result<()> {
    let failed = |reason: &str| Error::UndoFailed {
        path: operation.source.clone(),
        reason: reason.to_string(),
    };

    let Some(current) = &operation.destination else {
        return Err(failed("operation has no destination"));
    };
    if !current.exists() {
        return Err(failed(&format!("{} no longer exists", current.display())));
    }
    if operation.source.exists() {
        return Err(failed("original location is occupied"));
    }

    if let Some(parent) = operation.source.parent() {
        fs::create_dir_all(parent).map_err(|e| failed(&e.to_string()))?;
    }

    match operation.kind {
        OperationKind::Delete => {
            // Exclusive create: never overwrite something that appeared meanwhile
            copy_to_new(current, &operation.source).map_err(|e| failed(&e.to_string()))?;

            if let Some(expected) = operation.metadata.get(META_BLAKE3) {
                let restored = compute_cryptographic(&operation.source)
                    .map_err(|e| failed(&e.to_string()))?;
                if restored.to_hex().as_str() != expected {
                    // Keep the backup; the restored copy is not trustworthy
                    let _ = fs::remove_file(&operation.source);
                    return Err(failed("restored file does not match backup"));
                }
            }

            discard_backup(current);
            log_fs_modification(
                "restore",
                &operation.source,
                Some(&format!("from {}", current.display())),
            );
        }
        OperationKind::Move => {
            move_path(current, &operation.source).map_err(|e| failed(&e.to_string()))?;
            log_fs_modification(
                "move back",
                &operation.source,
                Some(&format!("from {}", current.display())),
            );
        }
    }

    Ok(())
}

/// Create and open the first free name among `name.ext`, `name_1.ext`,
/// `name_2.ext`, ... Creation is exclusive, so concurrent callers never
/// share a backup file.
fn claim_backup_path(dir: &Path, file_name: &Path) -> io::Result<(PathBuf, File)> {
    let stem = file_name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file_name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for counter in 0u64.. {
        let candidate = if counter == 0 {
            dir.join(file_name)
        } else {
            dir.join(format!("{}_{}{}", stem, counter, extension))
        };

        match create_exclusive(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "no free backup name",
    ))
}

fn create_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

/// Copy `from` into a file that must not exist yet at `to`
fn copy_to_new(from: &Path, to: &Path) -> io::Result<()> {
    let mut target = create_exclusive(to)?;
    let mut source = File::open(from)?;
    io::copy(&mut source, &mut target)?;
    target.sync_all()
}

/// Returns the hex digest when both files hash the same
fn verify_identical(original: &Path, backup: &Path) -> std::result::Result<String, String> {
    let expected = compute_cryptographic(original).map_err(|e| e.to_string())?;
    let actual = compute_cryptographic(backup).map_err(|e| e.to_string())?;
    if expected != actual {
        return Err("backup copy does not match original".to_string());
    }
    Ok(expected.to_hex().to_string())
}

fn discard_backup(backup: &Path) {
    if let Err(e) = fs::remove_file(backup) {
        log_file_error(backup, "remove backup", &e);
    }
}

/// Rename, falling back to copy + remove across file systems
fn move_path(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!("Rename failed ({}), copying instead", e);
            copy_to_new(from, to)?;
            fs::remove_file(from)
        }
    }
}
