#![allow(dead_code)]

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, Rgb, RgbImage};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Block pattern used for the base image of the scenario (33 bright cells)
pub const MASK: u64 = 0x0f0f_3c3c_a5a5_f0f1;

/// 256px image made of an 8×8 grid of 32px blocks, bright where the mask bit
/// is set. Its fingerprint is exactly `mask`.
pub fn mask_image(mask: u64) -> RgbImage {
    RgbImage::from_fn(256, 256, |x, y| {
        let bit = (y / 32) * 8 + (x / 32);
        let v = if mask & (1u64 << bit) != 0 { 220 } else { 40 };
        Rgb([v, v, v])
    })
}

pub fn save_png(dir: &Path, name: &str, mask: u64) -> PathBuf {
    let path = dir.join(name);
    mask_image(mask).save(&path).unwrap();
    path
}

pub fn save_jpeg(dir: &Path, name: &str, mask: u64, quality: u8) -> PathBuf {
    let path = dir.join(name);
    let img = mask_image(mask);
    let mut file = File::create(&path).unwrap();
    JpegEncoder::new_with_quality(&mut file, quality)
        .encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .unwrap();
    path
}

/// Five images:
/// - `a.png`: the base pattern
/// - `b.png`: a byte copy of `a.png`
/// - `c.jpg`: the base pattern with one cell changed, saved as JPEG
/// - `d.png`: the inverted pattern
/// - `e.png`: the base pattern with the lower half inverted
pub struct Scenario {
    pub a: PathBuf,
    pub b: PathBuf,
    pub c: PathBuf,
    pub d: PathBuf,
    pub e: PathBuf,
}

impl Scenario {
    pub fn create(dir: &Path) -> Self {
        let a = save_png(dir, "a.png", MASK);
        let b = dir.join("b.png");
        fs::copy(&a, &b).unwrap();
        let c = save_jpeg(dir, "c.jpg", MASK ^ 0b10, 95);
        let d = save_png(dir, "d.png", !MASK);
        let e = save_png(dir, "e.png", MASK ^ 0xffff_ffff_0000_0000);

        Self {
            a: a.canonicalize().unwrap(),
            b: b.canonicalize().unwrap(),
            c: c.canonicalize().unwrap(),
            d: d.canonicalize().unwrap(),
            e: e.canonicalize().unwrap(),
        }
    }

    pub fn all(&self) -> Vec<&PathBuf> {
        vec![&self.a, &self.b, &self.c, &self.d, &self.e]
    }
}
