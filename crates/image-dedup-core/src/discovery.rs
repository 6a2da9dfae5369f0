use log::{debug, info};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::log_skipped;
use crate::processing::file_validation::{get_file_extension, validate_metadata};
use crate::scan::CancellationToken;
use crate::types::{ImageFile, ImageFormat, SkipReason, SkippedFile};

/// Extensions considered during discovery. `psd` and `svg` are best effort:
/// they are listed but usually fail to decode.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif", "webp", "psd", "svg",
];

/// Snapshot of the candidate images under a root
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Candidates sorted by path, without repeats
    pub candidates: Vec<ImageFile>,

    /// Entries that looked like images but were left out
    pub skipped: Vec<SkippedFile>,
}

/// Discover candidate images under `root`.
///
/// The returned candidates are sorted and deduplicated by path, so repeated
/// calls over an unchanged tree give the same order regardless of how the
/// filesystem enumerates entries.
pub fn discover(root: &Path, recursive: bool, config: &Config) -> Result<Discovery> {
    discover_cancellable(root, recursive, config, &CancellationToken::new())
        .map(Option::unwrap_or_default)
}

/// As [`discover`], returning `None` when `cancel` fires during the walk
pub(crate) fn discover_cancellable(
    root: &Path,
    recursive: bool,
    config: &Config,
    cancel: &CancellationToken,
) -> Result<Option<Discovery>> {
    let root = resolve_root(root)?;
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut discovery = Discovery::default();

    for entry in WalkDir::new(&root).min_depth(1).max_depth(max_depth) {
        if cancel.is_cancelled() {
            info!("Discovery cancelled under {}", root.display());
            return Ok(None);
        }

        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Permission errors and vanished entries are recorded, not fatal
                if let Some(path) = e.path() {
                    record_skip(&mut discovery, path, SkipReason::Inaccessible(e.to_string()));
                } else {
                    debug!("Walk error without a path: {}", e);
                }
                continue;
            }
        };

        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let Some(format) = get_image_format(path).filter(ImageFormat::is_supported) else {
            continue;
        };

        match validate_metadata(path, config.max_file_size) {
            Ok(size) => discovery.candidates.push(ImageFile {
                path: path.to_path_buf(),
                size,
                format,
            }),
            Err(reason) => record_skip(&mut discovery, path, reason),
        }
    }

    discovery.candidates.sort_by(|a, b| a.path.cmp(&b.path));
    discovery.candidates.dedup_by(|a, b| a.path == b.path);

    info!(
        "Discovered {} candidate images under {} ({} skipped)",
        discovery.candidates.len(),
        root.display(),
        discovery.skipped.len()
    );

    Ok(Some(discovery))
}

/// Make the root absolute and check that it is a directory
pub(crate) fn resolve_root(root: &Path) -> Result<PathBuf> {
    let resolved = root
        .canonicalize()
        .map_err(|_| Error::InvalidRoot(root.to_path_buf()))?;

    if !resolved.is_dir() {
        return Err(Error::InvalidRoot(root.to_path_buf()));
    }

    Ok(resolved)
}

fn record_skip(discovery: &mut Discovery, path: &Path, reason: SkipReason) {
    let skipped = SkippedFile {
        path: path.to_path_buf(),
        reason,
    };
    log_skipped(&skipped);
    discovery.skipped.push(skipped);
}

/// Get image format from file extension
fn get_image_format(path: &Path) -> Option<ImageFormat> {
    let ext = get_file_extension(path);
    (!ext.is_empty()).then(|| ImageFormat::from_extension(&ext))
}

/// Returns if the given path has an allow-listed image extension
pub fn has_image_extension(path: &Path) -> bool {
    match get_image_format(path) {
        Some(format) => format.is_supported(),
        None => false,
    }
}

// -- Tests --
