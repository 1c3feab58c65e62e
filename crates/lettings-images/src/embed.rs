use image::imageops::FilterType;
use image::DynamicImage;
use lettings_core::Embedding;

use crate::ImageError;

/// Produces a fixed-length visual embedding for one decoded image.
pub trait ImageEmbedder: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed(&self, image: &DynamicImage) -> Result<Embedding, ImageError>;
}

/// Joint RGB histogram, 8 bins per channel (512 dimensions), L2-normalised.
#[derive(Debug, Clone, Default)]
pub struct ColorHistogramEmbedder;

const BINS: usize = 8;

impl ImageEmbedder for ColorHistogramEmbedder {
    fn name(&self) -> &str {
        "rgb-histogram-512"
    }

    fn dimensions(&self) -> usize {
        BINS * BINS * BINS
    }

    fn embed(&self, image: &DynamicImage) -> Result<Embedding, ImageError> {
        let rgb = image.resize(128, 128, FilterType::Triangle).to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(ImageError::Embedding("empty image".to_string()));
        }
        let mut counts = vec![0.0f32; self.dimensions()];
        for pixel in rgb.pixels() {
            let [r, g, b] = pixel.0;
            let bin = |v: u8| usize::from(v) * BINS / 256;
            counts[(bin(r) * BINS + bin(g)) * BINS + bin(b)] += 1.0;
        }
        let norm = counts.iter().map(|c| c * c).sum::<f32>().sqrt();
        for c in &mut counts {
            *c /= norm;
        }
        Ok(Embedding::new(counts))
    }
}
