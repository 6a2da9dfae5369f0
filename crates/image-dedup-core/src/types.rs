use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::processing::Fingerprint;

/// Supported image formats
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Tiff,
    Webp,
    Psd,
    Svg,
    Other(String),
}

impl ImageFormat {
    /// Determine format from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "png" => Self::Png,
            "jpg" | "jpeg" => Self::Jpeg,
            "gif" => Self::Gif,
            "bmp" => Self::Bmp,
            "tif" | "tiff" => Self::Tiff,
            "webp" => Self::Webp,
            "psd" => Self::Psd,
            "svg" => Self::Svg,
            other => Self::Other(other.to_string()),
        }
    }

    /// Check if format is on the discovery allow-list
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// Formats that are listed but usually fail to decode
    pub fn is_best_effort(&self) -> bool {
        matches!(self, Self::Psd | Self::Svg)
    }
}

/// A candidate image found during discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    /// Full path to the image file
    pub path: PathBuf,

    /// File size in bytes
    pub size: u64,

    /// Image format
    pub format: ImageFormat,
}

/// A fingerprinted image, alive only while a scan is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub fingerprint: Fingerprint,
}

/// Minimum similarity percentage for two fingerprints to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SimilarityThreshold(u8);

impl SimilarityThreshold {
    pub const MIN: u8 = 70;
    pub const MAX: u8 = 100;

    pub fn new(percent: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&percent) {
            Ok(Self(percent))
        } else {
            Err(Error::Configuration(format!(
                "Similarity threshold must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                percent
            )))
        }
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    /// Largest Hamming distance that still satisfies the threshold for
    /// fingerprints of `bits` width.
    ///
    /// `100 * (1 - d / bits) >= t` is evaluated as `100 * (bits - d) >= t * bits`
    /// so that no rounding is involved.
    pub fn max_distance(self, bits: u32) -> u32 {
        let threshold = u32::from(self.0);
        (0..=bits)
            .take_while(|d| 100 * (bits - d) >= threshold * bits)
            .last()
            .unwrap_or(0)
    }
}

impl Default for SimilarityThreshold {
    fn default() -> Self {
        Self(85)
    }
}

impl TryFrom<u8> for SimilarityThreshold {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SimilarityThreshold> for u8 {
    fn from(value: SimilarityThreshold) -> Self {
        value.0
    }
}

impl fmt::Display for SimilarityThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Why a file was left out of a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Larger than the configured size guard
    Oversize(u64),

    /// Empty file
    ZeroSized,

    /// Metadata or contents could not be accessed
    Inaccessible(String),

    /// The decoder rejected the file
    Undecodable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Oversize(size) => write!(f, "file too large ({} bytes)", size),
            SkipReason::ZeroSized => write!(f, "zero-sized file"),
            SkipReason::Inaccessible(msg) => write!(f, "inaccessible: {}", msg),
            SkipReason::Undecodable(msg) => write!(f, "undecodable: {}", msg),
        }
    }
}

/// A file that was skipped, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// One original and the images found to be duplicates of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// The first-seen image of the cluster
    pub original: PathBuf,

    /// Later images matched to the original, in processing order
    pub duplicates: Vec<PathBuf>,
}

/// Finalized groups of a single scan, in the order their originals were seen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    groups: Vec<DuplicateGroup>,
}

impl ScanResult {
    pub(crate) fn from_groups(groups: Vec<DuplicateGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[DuplicateGroup] {
        &self.groups
    }

    pub fn iter(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter()
    }

    /// Number of duplicate groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of files classified as duplicates
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.duplicates.len()).sum()
    }

    /// Duplicates recorded for the given original
    pub fn duplicates_of(&self, original: &Path) -> Option<&[PathBuf]> {
        self.groups
            .iter()
            .find(|g| g.original == original)
            .map(|g| g.duplicates.as_slice())
    }

    /// Every duplicate path across all groups
    pub fn all_duplicates(&self) -> impl Iterator<Item = &PathBuf> {
        self.groups.iter().flat_map(|g| g.duplicates.iter())
    }

    /// Original path → duplicate paths
    pub fn to_map(&self) -> BTreeMap<PathBuf, Vec<PathBuf>> {
        self.groups
            .iter()
            .map(|g| (g.original.clone(), g.duplicates.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a ScanResult {
    type Item = &'a DuplicateGroup;
    type IntoIter = std::slice::Iter<'a, DuplicateGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}
