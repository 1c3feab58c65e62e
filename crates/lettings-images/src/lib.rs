//! Image evidence: cached gallery downloads, perceptual hashes, visual
//! embeddings and gallery-level comparison.

use std::io::Cursor;

use image::{DynamicImage, ImageReader};
use lettings_storage::FetchError;
use thiserror::Error;

pub const CRATE_NAME: &str = "lettings-images";

pub mod compare;
pub mod embed;
pub mod gallery;
pub mod hashing;

pub use compare::{best_embedding_similarity, dedupe_images, gallery_overlap, GalleryOverlap};
pub use embed::{ColorHistogramEmbedder, ImageEmbedder};
pub use gallery::{GalleryJob, GalleryOutcome, GalleryPolicy, GalleryProcessor, ImageFailure};
pub use hashing::{ImageHashes, PerceptualHasher};

/// Decoded pixel ceiling; larger images are rejected before decoding.
pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("undecodable image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image {width}x{height} exceeds the {max_pixels} pixel ceiling")]
    Oversized {
        width: u32,
        height: u32,
        max_pixels: u64,
    },
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Cache(#[from] anyhow::Error),
}

/// Decode `bytes`, reading the header first so that oversized images are
/// refused without allocating their pixel buffer.
pub fn decode_image(bytes: &[u8], max_pixels: u64) -> Result<DynamicImage, ImageError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    if u64::from(width) * u64::from(height) > max_pixels {
        return Err(ImageError::Oversized {
            width,
            height,
            max_pixels,
        });
    }
    Ok(ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?)
}
