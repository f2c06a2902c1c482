//! Image-side perceptual hashing.
//!
//! All three hashes work on the grayscale (`luma8`) rendition of a frame,
//! downscaled with Lanczos3, and produce 64 bits in row-major order with the
//! first cell in the most significant bit.
//!
//! - **aHash**: 8×8, bit set when the pixel is brighter than the mean.
//! - **dHash**: 9×8, bit set when a pixel is brighter than its right neighbour.
//! - **pHash**: 32×32, 2-D DCT-II, the low-frequency 8×8 block thresholded at
//!   its median.

use std::f64::consts::PI;

use image::imageops::FilterType;
use image::GrayImage;
use livecheck_core::{HashTriple, PerceptualHash};

use crate::error::FingerprintError;

const GRID: u32 = 8;
const DCT_SIZE: u32 = 32;

/// What a decoded frame turned out to be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameAnalysis {
    /// Mean luminance under the blank threshold; carries the mean.
    Blank(f64),
    Hashed(HashTriple),
}

/// Decodes `bytes` (JPEG or PNG) and either rejects it as blank or hashes it.
///
/// # Errors
///
/// Returns [`FingerprintError::Decode`] when the bytes are not a decodable
/// image.
pub fn analyze_frame(
    bytes: &[u8],
    blank_luma_threshold: f64,
) -> Result<FrameAnalysis, FingerprintError> {
    let gray = image::load_from_memory(bytes)?.to_luma8();
    let mean = mean_luma(&gray);
    if mean < blank_luma_threshold {
        return Ok(FrameAnalysis::Blank(mean));
    }
    Ok(FrameAnalysis::Hashed(hash_triple(&gray)))
}

pub fn hash_triple(gray: &GrayImage) -> HashTriple {
    HashTriple {
        phash: phash(gray),
        ahash: ahash(gray),
        dhash: dhash(gray),
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn mean_luma(gray: &GrayImage) -> f64 {
    let count = u64::from(gray.width()) * u64::from(gray.height());
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|p| u64::from(p.0[0])).sum();
    sum as f64 / count as f64
}

pub fn ahash(gray: &GrayImage) -> PerceptualHash {
    let small = image::imageops::resize(gray, GRID, GRID, FilterType::Lanczos3);
    let values: Vec<f64> = small.pixels().map(|p| f64::from(p.0[0])).collect();
    #[allow(clippy::cast_precision_loss)]
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    pack_bits(values.iter().map(|&v| v > mean))
}

pub fn dhash(gray: &GrayImage) -> PerceptualHash {
    let small = image::imageops::resize(gray, GRID + 1, GRID, FilterType::Lanczos3);
    let bits = (0..GRID).flat_map(|y| {
        let small = &small;
        (0..GRID).map(move |x| small.get_pixel(x, y).0[0] > small.get_pixel(x + 1, y).0[0])
    });
    pack_bits(bits)
}

pub fn phash(gray: &GrayImage) -> PerceptualHash {
    let small = image::imageops::resize(gray, DCT_SIZE, DCT_SIZE, FilterType::Lanczos3);
    let n = DCT_SIZE as usize;
    let keep = GRID as usize;
    let pixels: Vec<f64> = small.pixels().map(|p| f64::from(p.0[0])).collect();

    let basis = dct_basis(n, keep);

    // Rows first: rows[y][u] for the kept horizontal frequencies.
    let mut rows = vec![0.0f64; n * keep];
    for y in 0..n {
        for u in 0..keep {
            rows[y * keep + u] = (0..n).map(|x| pixels[y * n + x] * basis[u * n + x]).sum();
        }
    }
    // Then columns: coeffs[v][u].
    let mut coeffs = Vec::with_capacity(keep * keep);
    for v in 0..keep {
        for u in 0..keep {
            coeffs.push((0..n).map(|y| rows[y * keep + u] * basis[v * n + y]).sum::<f64>());
        }
    }

    let median = median(&coeffs);
    pack_bits(coeffs.iter().map(|&c| c > median))
}

/// Orthonormal DCT-II basis: `basis[k * n + i]` for the first `keep`
/// frequencies.
#[allow(clippy::cast_precision_loss)]
fn dct_basis(n: usize, keep: usize) -> Vec<f64> {
    let nf = n as f64;
    let mut basis = Vec::with_capacity(keep * n);
    for k in 0..keep {
        let scale = if k == 0 {
            (1.0 / nf).sqrt()
        } else {
            (2.0 / nf).sqrt()
        };
        for i in 0..n {
            let angle = PI * (2.0 * i as f64 + 1.0) * k as f64 / (2.0 * nf);
            basis.push(scale * angle.cos());
        }
    }
    basis
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn pack_bits(bits: impl Iterator<Item = bool>) -> PerceptualHash {
    PerceptualHash::from_bits(bits.fold(0u64, |acc, b| (acc << 1) | u64::from(b)))
}
