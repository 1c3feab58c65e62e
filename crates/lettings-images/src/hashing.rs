use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use image_hasher::{HashAlg, HasherConfig};
use lettings_core::Hash64;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHashes {
    pub phash: Hash64,
    pub whash: Hash64,
    pub crop_hash: Hash64,
}

/// Computes the three 64-bit hash families for one image.
#[derive(Debug, Clone)]
pub struct PerceptualHasher {
    /// Fraction trimmed from every edge before the crop-resistant hash.
    pub crop_margin: f32,
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self { crop_margin: 0.1 }
    }
}

impl PerceptualHasher {
    pub fn hash(&self, img: &DynamicImage) -> ImageHashes {
        ImageHashes {
            phash: self.phash(img),
            whash: self.whash(img),
            crop_hash: self.crop_hash(img),
        }
    }

    /// DCT-based mean hash.
    pub fn phash(&self, img: &DynamicImage) -> Hash64 {
        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();
        let hash = hasher.hash_image(img);
        Hash64::from_bits(
            hash.as_bytes()
                .iter()
                .flat_map(|byte| (0..8).rev().map(move |bit| (byte >> bit) & 1 == 1)),
        )
    }

    /// Haar approximation: three levels of 2x2 averaging from 64x64 down to
    /// the 8x8 low-frequency band, thresholded at its median.
    pub fn whash(&self, img: &DynamicImage) -> Hash64 {
        let gray = img.resize_exact(64, 64, FilterType::Triangle).to_luma8();
        let mut band: Vec<f32> = gray.pixels().map(|p| f32::from(p.0[0])).collect();
        let mut size = 64usize;
        while size > 8 {
            let half = size / 2;
            let mut next = vec![0.0f32; half * half];
            for y in 0..half {
                for x in 0..half {
                    let at = |dx: usize, dy: usize| band[(2 * y + dy) * size + 2 * x + dx];
                    next[y * half + x] = (at(0, 0) + at(1, 0) + at(0, 1) + at(1, 1)) / 4.0;
                }
            }
            band = next;
            size = half;
        }
        median_bits(&band)
    }

    /// Tile hash over the central region: trims the borders (where crops
    /// and watermarks land), splits the rest into an 8x8 grid and keeps one
    /// above-median bit per tile.
    pub fn crop_hash(&self, img: &DynamicImage) -> Hash64 {
        let gray = img.to_luma8();
        let (w, h) = gray.dimensions();
        let margin = self.crop_margin.clamp(0.0, 0.4);
        let left = (w as f32 * margin) as u32;
        let top = (h as f32 * margin) as u32;
        let inner_w = (w - 2 * left).max(1);
        let inner_h = (h - 2 * top).max(1);
        let inner = image::imageops::crop_imm(&gray, left, top, inner_w, inner_h).to_image();
        median_bits(&tile_means(&inner, 8))
    }
}

fn tile_means(gray: &GrayImage, grid: u32) -> Vec<f32> {
    let resized = image::imageops::resize(gray, grid * 4, grid * 4, FilterType::Triangle);
    let mut means = Vec::with_capacity((grid * grid) as usize);
    for ty in 0..grid {
        for tx in 0..grid {
            let mut sum = 0.0f32;
            for y in 0..4 {
                for x in 0..4 {
                    sum += f32::from(resized.get_pixel(tx * 4 + x, ty * 4 + y).0[0]);
                }
            }
            means.push(sum / 16.0);
        }
    }
    means
}

fn median_bits(values: &[f32]) -> Hash64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let median = if sorted.is_empty() {
        0.0
    } else if sorted.len() % 2 == 0 {
        (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2]) / 2.0
    } else {
        sorted[sorted.len() / 2]
    };
    Hash64::from_bits(values.iter().map(|v| *v > median))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_image;
    use crate::test_support::synthetic_png;

    fn load(width: u32, height: u32, seed: u32) -> DynamicImage {
        decode_image(&synthetic_png(width, height, seed), crate::DEFAULT_MAX_PIXELS).unwrap()
    }

    #[test]
    fn identical_images_hash_identically() {
        let hasher = PerceptualHasher::default();
        assert_eq!(hasher.hash(&load(120, 90, 3)), hasher.hash(&load(120, 90, 3)));
    }

    #[test]
    fn resized_copy_stays_within_match_distance() {
        let hasher = PerceptualHasher::default();
        let original = hasher.hash(&load(240, 180, 5));
        let smaller = hasher.hash(&load(240, 180, 5).resize_exact(120, 90, FilterType::Lanczos3));
        let best = original
            .phash
            .distance(smaller.phash)
            .min(original.whash.distance(smaller.whash))
            .min(original.crop_hash.distance(smaller.crop_hash));
        assert!(best <= 8, "distance {best}");
    }

    #[test]
    fn tiny_images_do_not_panic() {
        let hasher = PerceptualHasher::default();
        let _ = hasher.hash(&load(1, 1, 0));
        let _ = hasher.hash(&load(3, 2, 4));
    }

    #[test]
    fn median_bits_marks_values_above_median() {
        let mut values = vec![0.0f32; 64];
        for v in values.iter_mut().take(8) {
            *v = 10.0;
        }
        assert_eq!(median_bits(&values), Hash64(0xff00_0000_0000_0000));
    }
}
