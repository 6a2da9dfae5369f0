//! # Perceptual Fingerprint Module
//!
//! Average-hash fingerprints for near-duplicate detection.
//!
//! ## Overview
//!
//! Unlike a cryptographic hash, an average hash stays the same (or nearly
//! the same) when an image is re-encoded, rescaled or recompressed:
//!
//! 1. Transparent images are composited onto a neutral grey background
//! 2. The image is divided into an 8×8 grid and each cell is box-averaged
//!    into a single luminance value
//! 3. Each cell becomes one bit: set when brighter than the grid mean
//!
//! ## Hamming Distance Interpretation
//!
//! Similarity between two fingerprints is `100 × (1 − distance / 64)`:
//!
//! - 0: identical fingerprints (100%)
//! - 1-9: near duplicates at the default 85% threshold
//! - >19: unrelated images even at the loosest 70% threshold
//!
//! Rotation and heavy cropping change the fingerprint completely; they are
//! not handled.

use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::SimilarityThreshold;

/// Width of a fingerprint in bits
pub const FINGERPRINT_BITS: u32 = 64;

/// Side of the luminance grid
const GRID: u32 = 8;

/// Images larger than this on either side are thumbnailed before sampling
const MAX_SAMPLE_SIDE: u32 = 512;

/// Background for alpha compositing
const NEUTRAL_BACKGROUND: [u8; 3] = [128, 128, 128];

/// A 64-bit average hash. Bit `i` corresponds to grid cell `i` in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    /// Calculate the Hamming distance between two fingerprints
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Similarity percentage in [0, 100]
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        100.0 * (1.0 - f64::from(self.distance(other)) / f64::from(FINGERPRINT_BITS))
    }

    /// Check if two images are similar enough under the given threshold
    pub fn is_similar(&self, other: &Fingerprint, threshold: SimilarityThreshold) -> bool {
        self.distance(other) <= threshold.max_distance(FINGERPRINT_BITS)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Composite any alpha channel onto the neutral background
pub fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let pixel = rgba.get_pixel(x, y);
        let alpha = u32::from(pixel[3]);
        let blend = |channel: u8, background: u8| -> u8 {
            ((u32::from(channel) * alpha + u32::from(background) * (255 - alpha) + 127) / 255) as u8
        };
        Rgb([
            blend(pixel[0], NEUTRAL_BACKGROUND[0]),
            blend(pixel[1], NEUTRAL_BACKGROUND[1]),
            blend(pixel[2], NEUTRAL_BACKGROUND[2]),
        ])
    })
}

/// Calculate the fingerprint of a decoded image
pub fn fingerprint(img: &DynamicImage) -> Result<Fingerprint> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::Image("image has no pixels".to_string()));
    }

    let rgb = if img.width() > MAX_SAMPLE_SIDE || img.height() > MAX_SAMPLE_SIDE {
        flatten_alpha(&img.thumbnail(MAX_SAMPLE_SIDE, MAX_SAMPLE_SIDE))
    } else {
        flatten_alpha(img)
    };

    let cells = luminance_grid(&rgb);
    let total: u64 = cells.iter().map(|&c| u64::from(c)).sum();

    // value > total / n, cross-multiplied so equal cells never set a bit
    let n = cells.len() as u64;
    let mut hash: u64 = 0;
    for (bit_pos, &value) in cells.iter().enumerate() {
        if u64::from(value) * n > total {
            hash |= 1u64 << bit_pos;
        }
    }

    Ok(Fingerprint(hash))
}

/// Decode a file and calculate its fingerprint.
///
/// The format is sniffed from the file contents, so a mislabelled extension
/// still decodes. Every failure is reported as [`Error::Unreadable`].
pub fn fingerprint_from_file<P: AsRef<Path>>(path: P) -> Result<Fingerprint> {
    let path = path.as_ref();
    let img = image::io::Reader::open(path)
        .map_err(|e| Error::unreadable(path, e))?
        .with_guessed_format()
        .map_err(|e| Error::unreadable(path, e))?
        .decode()
        .map_err(|e| Error::unreadable(path, e))?;

    fingerprint(&img).map_err(|e| Error::unreadable(path, e))
}

/// Box-average each grid cell into an integer luminance value
fn luminance_grid(rgb: &RgbImage) -> [u32; (GRID * GRID) as usize] {
    let (width, height) = rgb.dimensions();
    let mut cells = [0u32; (GRID * GRID) as usize];

    for gy in 0..GRID {
        let (y0, y1) = cell_bounds(gy, height);
        for gx in 0..GRID {
            let (x0, x1) = cell_bounds(gx, width);

            let mut sum: u64 = 0;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += u64::from(luma(rgb.get_pixel(x, y)));
                }
            }
            let count = u64::from(x1 - x0) * u64::from(y1 - y0);
            cells[(gy * GRID + gx) as usize] = ((sum + count / 2) / count) as u32;
        }
    }

    cells
}

/// Pixel range of one grid cell along an axis of `len` pixels (never empty)
fn cell_bounds(cell: u32, len: u32) -> (u32, u32) {
    let start = ((u64::from(cell) * u64::from(len)) / u64::from(GRID)) as u32;
    let end = ((u64::from(cell + 1) * u64::from(len)) / u64::from(GRID)) as u32;
    let start = start.min(len - 1);
    (start, end.max(start + 1))
}

// Grayscale formula: 0.299*R + 0.587*G + 0.114*B in 16.16 fixed point, rounded
#[inline]
fn luma(pixel: &Rgb<u8>) -> u8 {
    let weighted = 19_595 * u32::from(pixel[0])
        + 38_470 * u32::from(pixel[1])
        + 7_471 * u32::from(pixel[2]);
    ((weighted + 0x8000) >> 16) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Write;
    use tempfile::tempdir;

    /// 8×8 grid of 16px blocks, bright where the mask bit is set
    fn mask_image(mask: u64) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(128, 128, |x, y| {
            let bit = (y / 16) * 8 + (x / 16);
            let v = if mask & (1u64 << bit) != 0 { 220 } else { 40 };
            Rgb([v, v, v])
        }))
    }

    #[test]
    fn test_fingerprint_matches_block_mask() {
        let mask = 0x0123_4567_89ab_cdef;
        assert_eq!(fingerprint(&mask_image(mask)).unwrap(), Fingerprint(mask));
    }

    #[test]
    fn test_fingerprint_survives_rescale() {
        let mask = 0xf0f0_0f0f_aa55_3c3c;
        let img = mask_image(mask);
        let small = img.resize_exact(64, 64, image::imageops::FilterType::Triangle);
        let large = img.resize_exact(1024, 1024, image::imageops::FilterType::Triangle);

        let original = fingerprint(&img).unwrap();
        assert!(original.distance(&fingerprint(&small).unwrap()) <= 2);
        assert!(original.distance(&fingerprint(&large).unwrap()) <= 2);
    }

    #[test]
    fn test_uniform_image_has_empty_fingerprint() {
        let img = DynamicImage::new_rgb8(32, 32);
        assert_eq!(fingerprint(&img).unwrap(), Fingerprint(0));
    }

    #[test]
    fn test_solid_colour_hashes_the_same_at_any_size() {
        let sizes = [(1, 1), (3, 2), (37, 53), (100, 100), (250, 173), (511, 300)];
        let colours = [[200, 100, 50], [17, 201, 99], [255, 255, 255], [128, 128, 128]];

        for colour in colours {
            for (w, h) in sizes {
                let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb(colour)));
                assert_eq!(
                    fingerprint(&img).unwrap(),
                    Fingerprint(0),
                    "{}x{} {:?}",
                    w,
                    h,
                    colour
                );
            }
        }
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(&Rgb([0, 0, 0])), 0);
        assert_eq!(luma(&Rgb([255, 255, 255])), 255);
        assert_eq!(luma(&Rgb([255, 0, 0])), 76);
        assert_eq!(luma(&Rgb([0, 255, 0])), 150);
    }

    #[test]
    fn test_tiny_image_is_fingerprinted() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(3, 2, |x, _| {
            Rgb([(x * 100) as u8, 0, 0])
        }));
        assert!(fingerprint(&img).is_ok());
    }

    #[test]
    fn test_transparent_pixels_become_neutral() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([255, 0, 0, 0])));
        let flat = flatten_alpha(&img);
        assert_eq!(flat.get_pixel(0, 0), &Rgb(NEUTRAL_BACKGROUND));
    }

    #[test]
    fn test_opaque_alpha_is_unchanged() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255])));
        let flat = flatten_alpha(&img);
        assert_eq!(flat.get_pixel(3, 3), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_distance_and_similarity() {
        let a = Fingerprint(0);
        let b = Fingerprint(0b111);
        assert_eq!(a.distance(&b), 3);
        assert_eq!(a.distance(&a), 0);
        assert!((a.similarity(&Fingerprint(u64::MAX)) - 0.0).abs() < f64::EPSILON);
        assert!((a.similarity(&a) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_is_similar_respects_threshold() {
        let exact = SimilarityThreshold::new(100).unwrap();
        let loose = SimilarityThreshold::new(85).unwrap();
        let a = Fingerprint(0);
        let nine_bits = Fingerprint(0x1ff);
        let ten_bits = Fingerprint(0x3ff);

        assert!(a.is_similar(&a, exact));
        assert!(!a.is_similar(&Fingerprint(1), exact));
        assert!(a.is_similar(&nine_bits, loose));
        assert!(!a.is_similar(&ten_bits, loose));
    }

    #[test]
    fn test_zero_byte_file_is_unreadable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.png");
        std::fs::File::create(&path).unwrap();

        let result = fingerprint_from_file(&path);
        assert!(matches!(result, Err(Error::Unreadable { .. })));
    }

    #[test]
    fn test_corrupt_file_is_unreadable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corrupt.jpg");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"DUMMY IMAGE DATA").unwrap();

        let result = fingerprint_from_file(&path);
        assert!(matches!(result, Err(Error::Unreadable { .. })));
    }

    #[test]
    fn test_fingerprint_from_saved_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let mask = 0x00ff_00ff_00ff_00ff;
        mask_image(mask).save(&path).unwrap();

        assert_eq!(fingerprint_from_file(&path).unwrap(), Fingerprint(mask));
    }
}
